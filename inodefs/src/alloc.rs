use crate::config::DiskConfig;
use crate::error::{FsError, Result};
use crate::io::{FlatFile, FlatStorage};
use crate::{BlockIndex, NUM_BLOCKS};
use log::{debug, warn};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State {
    Free,
    Used,
}

impl State {
    /// The digit used for this state in the raw table and in debug output.
    pub fn as_byte(self) -> u8 {
        match self {
            State::Free => 0,
            State::Used => 1,
        }
    }
}

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy, Debug, PartialEq)]
pub struct Bitmap {
    /// One byte per block, 0 for free and 1 for used. This is also the exact
    /// on-disk layout of the block allocation table: no header, no padding.
    slots: [u8; NUM_BLOCKS],
}

impl Bitmap {
    pub fn new() -> Self {
        Self::new_zeroed()
    }

    /// Reads a table from the raw bytes of the allocation table file.
    ///
    /// # Errors
    ///
    /// The buffer must hold exactly `NUM_BLOCKS` bytes, each 0 or 1.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let map = Bitmap::read_from(buf).ok_or(FsError::TableLength(buf.len()))?;
        if let Some((index, &value)) = map.slots.iter().enumerate().find(|&(_, &v)| v > 1) {
            return Err(FsError::CorruptTable { index, value });
        }
        Ok(map)
    }

    pub fn serialize(&self) -> &[u8] {
        self.as_bytes()
    }

    pub fn get(&self, blocknr: BlockIndex) -> State {
        assert!(blocknr < NUM_BLOCKS);
        match self.slots[blocknr] {
            0 => State::Free,
            _ => State::Used,
        }
    }

    pub fn set_reserved(&mut self, blocknr: BlockIndex) {
        assert!(blocknr < NUM_BLOCKS);
        self.slots[blocknr] = State::Used.as_byte();
    }

    pub fn set_free(&mut self, blocknr: BlockIndex) {
        assert!(blocknr < NUM_BLOCKS);
        self.slots[blocknr] = State::Free.as_byte();
    }

    /// Lowest-numbered free block, if any.
    pub fn first_free(&self) -> Option<BlockIndex> {
        self.slots.iter().position(|&slot| slot == 0)
    }

    pub fn states(&self) -> Vec<State> {
        (0..NUM_BLOCKS).map(|i| self.get(i)).collect()
    }
}

impl Default for Bitmap {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands out blocks of the simulated disk.
///
/// The allocator keeps no state between calls. Every operation re-reads the
/// whole table from storage, changes it and writes the whole table back, so
/// each call is immediately visible to the next one, including one made by a
/// later process. Two processes working on the same table at once will race.
pub struct BlockAllocator<T: FlatStorage> {
    table: T,
}

impl BlockAllocator<FlatFile> {
    pub fn open(config: &DiskConfig) -> Self {
        Self::new(config.bat())
    }
}

impl<T: FlatStorage> BlockAllocator<T> {
    pub fn new(table: T) -> Self {
        Self { table }
    }

    /// Replaces any existing table with one where every block is free.
    pub fn format(&mut self) -> Result<()> {
        match self.table.discard() {
            Ok(()) => (),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
            Err(e) => return Err(e.into()),
        }
        self.write_table(&Bitmap::new())?;
        debug!("Formatted block allocation table with {} blocks.", NUM_BLOCKS);
        Ok(())
    }

    /// Reserves the lowest-numbered free block and returns its index.
    ///
    /// # Errors
    ///
    /// Returns `AllocationExhausted` when every block is in use.
    pub fn allocate(&mut self) -> Result<BlockIndex> {
        let mut map = self.read_table()?;
        let blocknr = match map.first_free() {
            Some(blocknr) => blocknr,
            None => {
                warn!("No free block left out of {}.", NUM_BLOCKS);
                return Err(FsError::AllocationExhausted);
            }
        };
        map.set_reserved(blocknr);
        self.write_table(&map)?;
        debug!("Allocated block {}.", blocknr);
        Ok(blocknr)
    }

    /// Returns a used block to the free pool.
    ///
    /// # Errors
    ///
    /// `InvalidBlockIndex` for an index past the end of the disk and
    /// `NotAllocated` for a block that is already free. Neither changes the
    /// table.
    pub fn free(&mut self, blocknr: BlockIndex) -> Result<()> {
        if blocknr >= NUM_BLOCKS {
            warn!("Block number {} is not valid.", blocknr);
            return Err(FsError::InvalidBlockIndex(blocknr));
        }
        let mut map = self.read_table()?;
        if map.get(blocknr) != State::Used {
            warn!("Block {} was not allocated.", blocknr);
            return Err(FsError::NotAllocated(blocknr));
        }
        map.set_free(blocknr);
        self.write_table(&map)?;
        debug!("Freed block {}.", blocknr);
        Ok(())
    }

    /// Snapshot of every block's state, in block order.
    pub fn inspect(&mut self) -> Result<Vec<State>> {
        Ok(self.read_table()?.states())
    }

    fn read_table(&mut self) -> Result<Bitmap> {
        let buf = self.table.read_all()?;
        Bitmap::parse(&buf)
    }

    fn write_table(&mut self, map: &Bitmap) -> Result<()> {
        self.table.write_all(map.serialize())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn formatted_allocator() -> (TempDir, BlockAllocator<FlatFile>) {
        let dir = tempfile::tempdir().unwrap();
        let mut alloc = BlockAllocator::new(FlatFile::new(dir.path().join("bat")));
        alloc.format().unwrap();
        (dir, alloc)
    }

    #[test]
    fn can_read_and_write_values_to_bitmap() {
        let mut bmp = Bitmap::new();

        bmp.set_reserved(2);

        assert_eq!(bmp.get(0), State::Free);
        assert_eq!(bmp.get(2), State::Used);
    }

    #[test]
    fn can_set_values_at_ends_of_bitmap() {
        let mut bmp = Bitmap::new();

        bmp.set_reserved(0);
        bmp.set_reserved(NUM_BLOCKS - 1);

        assert_eq!(bmp.get(0), State::Used);
        assert_eq!(bmp.get(NUM_BLOCKS - 1), State::Used);
        assert_eq!(bmp.first_free(), Some(1));
    }

    #[test]
    fn can_toggle_block_between_free_and_used() {
        let mut bmp = Bitmap::new();

        bmp.set_reserved(10);
        assert_eq!(bmp.get(10), State::Used);

        bmp.set_free(10);
        assert_eq!(bmp.get(10), State::Free);
    }

    #[test]
    fn serialized_bitmap_is_one_byte_per_block() {
        let mut bmp = Bitmap::new();
        bmp.set_reserved(1);
        bmp.set_reserved(3);

        let raw = bmp.serialize();
        assert_eq!(raw.len(), NUM_BLOCKS);
        assert_eq!(&raw[0..5], &[0, 1, 0, 1, 0]);
        assert_eq!(Bitmap::parse(raw).unwrap(), bmp);
    }

    #[test]
    fn parsing_rejects_wrong_length_and_values() {
        match Bitmap::parse(&[0; 12]).unwrap_err() {
            FsError::TableLength(12) => (),
            e => panic!("unexpected error: {:?}", e),
        }

        let mut raw = vec![0; NUM_BLOCKS];
        raw[7] = 2;
        match Bitmap::parse(&raw).unwrap_err() {
            FsError::CorruptTable { index: 7, value: 2 } => (),
            e => panic!("unexpected error: {:?}", e),
        }
    }

    #[test]
    fn format_writes_all_free_table() {
        let (dir, mut alloc) = formatted_allocator();

        let raw = std::fs::read(dir.path().join("bat")).unwrap();
        assert_eq!(raw, vec![0; NUM_BLOCKS]);
        assert!(alloc.inspect().unwrap().iter().all(|s| *s == State::Free));
    }

    #[test]
    fn format_replaces_used_table() {
        let (_dir, mut alloc) = formatted_allocator();
        alloc.allocate().unwrap();
        alloc.allocate().unwrap();

        alloc.format().unwrap();
        assert_eq!(alloc.allocate().unwrap(), 0);
    }

    #[test]
    fn allocates_lowest_free_block_first() {
        let (_dir, mut alloc) = formatted_allocator();

        assert_eq!(alloc.allocate().unwrap(), 0);
        assert_eq!(alloc.allocate().unwrap(), 1);
        assert_eq!(alloc.allocate().unwrap(), 2);

        alloc.free(1).unwrap();
        assert_eq!(alloc.allocate().unwrap(), 1);
        assert_eq!(alloc.allocate().unwrap(), 3);
    }

    #[test]
    fn allocation_is_persisted_between_allocators() {
        let (dir, mut alloc) = formatted_allocator();
        alloc.allocate().unwrap();

        let mut reopened = BlockAllocator::new(FlatFile::new(dir.path().join("bat")));
        assert_eq!(reopened.inspect().unwrap()[0], State::Used);
        assert_eq!(reopened.allocate().unwrap(), 1);
    }

    #[test]
    fn exhausted_disk_reports_no_space() {
        let (_dir, mut alloc) = formatted_allocator();
        for i in 0..NUM_BLOCKS {
            assert_eq!(alloc.allocate().unwrap(), i);
        }

        match alloc.allocate().unwrap_err() {
            FsError::AllocationExhausted => (),
            e => panic!("unexpected error: {:?}", e),
        }
    }

    #[test]
    fn freeing_invalid_or_free_blocks_fails_without_change() {
        let (_dir, mut alloc) = formatted_allocator();
        alloc.allocate().unwrap();
        let before = alloc.inspect().unwrap();

        match alloc.free(NUM_BLOCKS).unwrap_err() {
            FsError::InvalidBlockIndex(i) => assert_eq!(i, NUM_BLOCKS),
            e => panic!("unexpected error: {:?}", e),
        }
        match alloc.free(5).unwrap_err() {
            FsError::NotAllocated(5) => (),
            e => panic!("unexpected error: {:?}", e),
        }
        assert_eq!(alloc.inspect().unwrap(), before);
    }

    #[test]
    fn operations_on_missing_table_are_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut alloc = BlockAllocator::new(FlatFile::new(dir.path().join("bat")));

        match alloc.allocate().unwrap_err() {
            FsError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            e => panic!("unexpected error: {:?}", e),
        }
    }
}
