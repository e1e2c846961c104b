use crate::{BlockIndex, InodeId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("io error on simulated disk")]
    Io(#[from] std::io::Error),
    #[error("no free block left on the simulated disk")]
    AllocationExhausted,
    #[error("no inode id left to assign")]
    IdsExhausted,
    #[error("block number {0} is not valid")]
    InvalidBlockIndex(BlockIndex),
    #[error("block {0} was not allocated")]
    NotAllocated(BlockIndex),
    #[error("inode {child} is not a direct child of inode {parent}")]
    NotDirectChild { parent: InodeId, child: InodeId },
    #[error("directory {0} still has children")]
    NonEmptyDirectory(InodeId),
    #[error("inode {0} is not a directory")]
    NotADirectory(InodeId),
    #[error("inode {0} is a directory")]
    IsADirectory(InodeId),
    #[error("invalid inode name: {0:?}")]
    InvalidName(String),
    #[error("block allocation table has {0} entries")]
    TableLength(usize),
    #[error("block allocation table entry {index} holds invalid value {value}")]
    CorruptTable { index: BlockIndex, value: u8 },
    #[error("malformed master file table: {0}")]
    Corrupt(#[from] DecodeError),
}

/// Reasons a master file table stream can be rejected.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("stream is empty")]
    EmptyTable,
    #[error("record truncated at offset {0}")]
    Truncated(usize),
    #[error("invalid directory flag {flag} at offset {offset}")]
    BadDirectoryFlag { offset: usize, flag: u8 },
    #[error("name of inode {0} is not terminated")]
    UnterminatedName(InodeId),
    #[error("name of inode {0} is empty or not valid utf-8")]
    BadName(InodeId),
    #[error("identifier {0} does not fit in an inode id")]
    IdOverflow(u64),
    #[error("file {inode} references block {block} past the end of the disk")]
    BadBlock { inode: InodeId, block: u64 },
    #[error("block {block} of file {inode} is already owned by another file or listed twice")]
    DuplicateBlock { inode: InodeId, block: BlockIndex },
    #[error("more than one record with id {0}")]
    DuplicateRecord(InodeId),
    #[error("inode {parent} references unknown child {child}")]
    UnknownChild { parent: InodeId, child: InodeId },
    #[error("inode {0} is referenced more than once")]
    DuplicateChild(InodeId),
    #[error("inode {0} is not reachable from the root")]
    Orphan(InodeId),
}

pub type Result<T> = std::result::Result<T, FsError>;
