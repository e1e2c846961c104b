use crate::alloc::{BlockAllocator, State};
use crate::codec;
use crate::config::DiskConfig;
use crate::dump;
use crate::error::{DecodeError, FsError, Result};
use crate::io::{FlatFile, FlatStorage};
use crate::node::{blocks_needed, validate_name, Inode, InodeIds};
use crate::{BlockIndex, InodeId};
use log::{debug, info, warn};
use std::collections::HashSet;

/// A simulated disk: the block allocator for file data plus the counter that
/// names new inodes.
///
/// The inode tree itself is not stored here. Callers own the root returned
/// by `create_root` or `load` and pass the directories they want to change.
pub struct SimFs<T: FlatStorage> {
    blocks: BlockAllocator<T>,
    ids: InodeIds,
}

impl SimFs<FlatFile> {
    pub fn open(config: &DiskConfig) -> Self {
        Self::new(BlockAllocator::open(config))
    }
}

impl<T: FlatStorage> SimFs<T> {
    pub fn new(blocks: BlockAllocator<T>) -> Self {
        Self {
            blocks,
            ids: InodeIds::new(),
        }
    }

    pub fn blocks(&mut self) -> &mut BlockAllocator<T> {
        &mut self.blocks
    }

    pub fn ids(&self) -> &InodeIds {
        &self.ids
    }

    /// Renders the current block allocation table, see `dump::BitmapDump`.
    pub fn dump_bitmap(&mut self) -> Result<String> {
        Ok(dump::dump_bitmap(&self.blocks.inspect()?))
    }

    /// Marks every block of the disk free.
    pub fn format(&mut self) -> Result<()> {
        self.blocks.format()
    }

    /// Creates a directory with no parent. This is how a tree starts.
    pub fn create_root(&mut self, name: &str) -> Result<Inode> {
        validate_name(name)?;
        let root = Inode::directory(self.ids.next_id()?, name.to_string(), vec![]);
        debug!("Created root directory {} ({}).", root.id(), name);
        Ok(root)
    }

    /// Creates an empty directory as the last child of `parent`.
    pub fn create_directory<'a>(
        &mut self,
        parent: &'a mut Inode,
        name: &str,
    ) -> Result<&'a mut Inode> {
        validate_name(name)?;
        if !parent.is_directory() {
            return Err(FsError::NotADirectory(parent.id()));
        }
        let dir = Inode::directory(self.ids.next_id()?, name.to_string(), vec![]);
        debug!("Created directory {} ({}) in {}.", dir.id(), name, parent.id());
        parent.attach(dir)
    }

    /// Creates a file of `size` bytes as the last child of `parent`,
    /// reserving its blocks on disk.
    ///
    /// # Errors
    ///
    /// If the disk runs out of blocks part way, the blocks already reserved
    /// for this file are released again and `AllocationExhausted` is
    /// returned. No inode is created in that case. The same holds when no
    /// inode id is left (`IdsExhausted`).
    pub fn create_file<'a>(
        &mut self,
        parent: &'a mut Inode,
        name: &str,
        size: u32,
    ) -> Result<&'a mut Inode> {
        validate_name(name)?;
        if !parent.is_directory() {
            return Err(FsError::NotADirectory(parent.id()));
        }

        let needed = blocks_needed(size);
        let mut blocks = Vec::with_capacity(needed);
        for _ in 0..needed {
            match self.blocks.allocate() {
                Ok(block) => blocks.push(block),
                Err(e) => {
                    warn!(
                        "Could not reserve {} blocks for {}, releasing {}.",
                        needed,
                        name,
                        blocks.len()
                    );
                    self.release(&blocks);
                    return Err(e);
                }
            }
        }

        let id = match self.ids.next_id() {
            Ok(id) => id,
            Err(e) => {
                self.release(&blocks);
                return Err(e);
            }
        };
        let file = Inode::file(id, name.to_string(), size, blocks);
        debug!(
            "Created file {} ({}, {} bytes) in {} with blocks {:?}.",
            file.id(),
            name,
            size,
            parent.id(),
            file.blocks()
        );
        parent.attach(file)
    }

    /// Deletes the file `id`, a direct child of `parent`, and frees its
    /// blocks. Nothing changes when an error is returned, unless the table
    /// itself can't be read or written.
    pub fn delete_file(&mut self, parent: &mut Inode, id: InodeId) -> Result<()> {
        let node = direct_child(parent, id)?;
        if node.is_directory() {
            return Err(FsError::IsADirectory(id));
        }

        let table = self.blocks.inspect()?;
        let mut seen = HashSet::with_capacity(node.num_blocks());
        for &block in node.blocks() {
            if table.get(block) != Some(&State::Used) {
                warn!("File {} owns block {} which is not allocated.", id, block);
                return Err(FsError::NotAllocated(block));
            }
            // A second free of the same block would fail after the file is
            // already detached.
            if !seen.insert(block) {
                warn!("File {} lists block {} more than once.", id, block);
                return Err(FsError::NotAllocated(block));
            }
        }

        let node = parent.detach(id)?;
        for &block in node.blocks() {
            self.blocks.free(block)?;
        }
        debug!("Deleted file {} ({}) from {}.", id, node.name(), parent.id());
        Ok(())
    }

    /// Deletes the empty directory `id`, a direct child of `parent`.
    /// Directories are never emptied recursively.
    pub fn delete_directory(&mut self, parent: &mut Inode, id: InodeId) -> Result<()> {
        let node = direct_child(parent, id)?;
        if !node.is_directory() {
            return Err(FsError::NotADirectory(id));
        }
        if node.num_children() > 0 {
            warn!(
                "Directory {} ({}) still has {} children.",
                id,
                node.name(),
                node.num_children()
            );
            return Err(FsError::NonEmptyDirectory(id));
        }

        let node = parent.detach(id)?;
        debug!("Deleted directory {} ({}) from {}.", id, node.name(), parent.id());
        Ok(())
    }

    /// Writes the tree below `root` to the master file table.
    pub fn save<S: FlatStorage>(&self, root: &Inode, mft: &mut S) -> Result<()> {
        let buf = codec::encode(root);
        mft.write_all(&buf)?;
        info!(
            "Saved {} inodes ({} bytes) to master file table.",
            root.walk().count(),
            buf.len()
        );
        Ok(())
    }

    /// Reads a tree back from the master file table. New inodes created
    /// afterwards get ids above every loaded one.
    pub fn load<S: FlatStorage>(&mut self, mft: &mut S) -> Result<Inode> {
        let buf = mft.read_all()?;
        let root = codec::decode(&buf)?;
        let max_id = root.max_id();
        let next = max_id
            .checked_add(1)
            .ok_or(DecodeError::IdOverflow(u64::from(max_id) + 1))?;
        self.ids.reseed(next);
        info!(
            "Loaded {} inodes from master file table, next id is {:?}.",
            root.walk().count(),
            self.ids.peek()
        );
        Ok(root)
    }

    fn release(&mut self, blocks: &[BlockIndex]) {
        for &block in blocks {
            if let Err(e) = self.blocks.free(block) {
                warn!("Failed to release block {}: {}.", block, e);
            }
        }
    }
}

fn direct_child<'a>(parent: &'a Inode, id: InodeId) -> Result<&'a Inode> {
    if !parent.is_directory() {
        return Err(FsError::NotADirectory(parent.id()));
    }
    parent.child(id).ok_or_else(|| {
        warn!("Inode {} is not a direct child of {}.", id, parent.id());
        FsError::NotDirectChild {
            parent: parent.id(),
            child: id,
        }
    })
}
