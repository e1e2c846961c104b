//! A small simulated filesystem.
//!
//! The "disk" is two flat files: a block allocation table with one byte per
//! block, and a master file table holding the serialized inode tree. File
//! data itself is never stored, only which blocks a file would occupy.
pub mod alloc;
pub mod codec;
pub mod config;
pub mod dump;
pub mod error;
pub mod fs;
pub mod io;
pub mod node;

pub use crate::alloc::{BlockAllocator, State};
pub use crate::config::DiskConfig;
pub use crate::error::{DecodeError, FsError};
pub use crate::fs::SimFs;
pub use crate::node::{Inode, InodeIds};

/// Size of a file data block in bytes.
pub const BLOCK_SIZE: usize = 4096;
/// Number of blocks on the simulated disk.
pub const NUM_BLOCKS: usize = 50;

pub type InodeId = u32;
/// The block number ranging from 0 (the first block) to `NUM_BLOCKS - 1`.
pub type BlockIndex = usize;
