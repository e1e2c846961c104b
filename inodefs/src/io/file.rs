use crate::io::FlatStorage;
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::path::{Path, PathBuf};

/// Stores a table in a regular file on the host filesystem.
#[derive(Debug, Clone)]
pub struct FlatFile {
    path: PathBuf,
}

impl FlatFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FlatStorage for FlatFile {
    fn read_all(&mut self) -> std::io::Result<Vec<u8>> {
        let mut fd = File::open(&self.path)?;
        let mut buf = vec![];
        fd.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        let mut fd = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        fd.write_all(buf)?;
        fd.sync_all()
    }

    fn discard(&mut self) -> std::io::Result<()> {
        std::fs::remove_file(&self.path)
    }
}
