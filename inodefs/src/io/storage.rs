/// A single named flat file holding either the block allocation table or the
/// master file table.
///
/// Both tables are always read and written whole, so the interface is
/// deliberately coarser than a block device: there is no seeking and no
/// partial update.
pub trait FlatStorage {
    /// Reads the entire content of the file.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file does not exist.
    fn read_all(&mut self) -> std::io::Result<Vec<u8>>;
    /// Replaces the content of the file with `buf`, creating it if needed.
    /// The write is flushed before returning so the next reader observes it.
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;
    /// Removes the file.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there was nothing to remove; callers decide if
    /// that matters.
    fn discard(&mut self) -> std::io::Result<()>;
}
