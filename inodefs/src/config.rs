use crate::error::{FsError, Result};
use crate::io::FlatFile;
use std::path::{Path, PathBuf};

/// Names the two flat files that make up a simulated disk. Built once per
/// run and handed to whatever needs to reach the tables.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskConfig {
    mft_path: PathBuf,
    bat_path: PathBuf,
}

impl DiskConfig {
    /// # Errors
    ///
    /// Fails with `Configuration` if either path is empty.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(mft_path: P, bat_path: Q) -> Result<Self> {
        let mft_path = mft_path.as_ref();
        let bat_path = bat_path.as_ref();
        if mft_path.as_os_str().is_empty() {
            return Err(FsError::Configuration(
                "master file table name is not set".to_string(),
            ));
        }
        if bat_path.as_os_str().is_empty() {
            return Err(FsError::Configuration(
                "block allocation table name is not set".to_string(),
            ));
        }
        Ok(Self {
            mft_path: mft_path.to_path_buf(),
            bat_path: bat_path.to_path_buf(),
        })
    }

    pub fn mft_path(&self) -> &Path {
        &self.mft_path
    }

    pub fn bat_path(&self) -> &Path {
        &self.bat_path
    }

    pub fn mft(&self) -> FlatFile {
        FlatFile::new(&self.mft_path)
    }

    pub fn bat(&self) -> FlatFile {
        FlatFile::new(&self.bat_path)
    }
}
