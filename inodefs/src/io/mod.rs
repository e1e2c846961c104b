mod file;
mod storage;

pub use file::FlatFile;
pub use storage::FlatStorage;
