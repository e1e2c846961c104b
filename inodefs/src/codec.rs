//! Binary layout of the master file table.
//!
//! The table is the root's record followed by its descendants in pre-order.
//! There is no header and no terminator; each record is sized by its own
//! fields. All integers are little-endian.
//!
//! ```text
//! id            u32
//! name_length   u32   (name bytes + 1 for the trailing NUL)
//! name          [u8; name_length]
//! is_directory  u8    (0 = file, 1 = directory)
//! directory:
//!   num_children  u32
//!   child_ids     [u64; num_children]
//!   child records, in the same order as child_ids
//! file:
//!   filesize      u32
//!   num_blocks    u32
//!   block_ids     [u64; num_blocks]
//! ```
use crate::error::DecodeError;
use crate::node::Inode;
use crate::{BlockIndex, InodeId, NUM_BLOCKS};
use log::debug;
use std::collections::{HashMap, HashSet};

const FILE_FLAG: u8 = 0;
const DIRECTORY_FLAG: u8 = 1;

/// Serializes `root` and everything below it.
pub fn encode(root: &Inode) -> Vec<u8> {
    let mut buf = vec![];
    for (_, node) in root.walk() {
        encode_record(&mut buf, node);
    }
    buf
}

/// Writes one record. A directory's children follow it in the walk order,
/// so only their ids are written here.
fn encode_record(buf: &mut Vec<u8>, node: &Inode) {
    buf.extend_from_slice(&node.id().to_le_bytes());
    let name_length = node.name().len() as u32 + 1;
    buf.extend_from_slice(&name_length.to_le_bytes());
    buf.extend_from_slice(node.name().as_bytes());
    buf.push(0);

    if node.is_directory() {
        buf.push(DIRECTORY_FLAG);
        buf.extend_from_slice(&(node.num_children() as u32).to_le_bytes());
        for child in node.children() {
            buf.extend_from_slice(&u64::from(child.id()).to_le_bytes());
        }
    } else {
        buf.push(FILE_FLAG);
        buf.extend_from_slice(&node.size().to_le_bytes());
        buf.extend_from_slice(&(node.num_blocks() as u32).to_le_bytes());
        for &block in node.blocks() {
            buf.extend_from_slice(&(block as u64).to_le_bytes());
        }
    }
}

/// Rebuilds a tree from its serialized form. The first record is the root.
///
/// Records are first read into a flat list where directories only know
/// their children's ids, then the ids are resolved into owned children.
/// Every referenced id must exist and be referenced once, every record
/// must be reachable from the root, and no block may belong to more than one
/// file or appear twice in the same file.
pub fn decode(buf: &[u8]) -> Result<Inode, DecodeError> {
    let records = read_records(buf)?;
    debug!("Decoded {} inode records.", records.len());
    link(records)
}

#[derive(Debug)]
enum Body {
    Directory(Vec<InodeId>),
    File { size: u32, blocks: Vec<BlockIndex> },
}

#[derive(Debug)]
struct Record {
    id: InodeId,
    name: String,
    body: Body,
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(DecodeError::Truncated(self.pos))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let mut raw = [0; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let mut raw = [0; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }
}

fn read_records(buf: &[u8]) -> Result<Vec<Record>, DecodeError> {
    if buf.is_empty() {
        return Err(DecodeError::EmptyTable);
    }
    let mut reader = Reader::new(buf);
    let mut records = vec![];
    while !reader.is_empty() {
        records.push(read_record(&mut reader)?);
    }
    Ok(records)
}

fn read_record(r: &mut Reader<'_>) -> Result<Record, DecodeError> {
    let id = r.u32()?;
    let name_length = r.u32()? as usize;
    let raw_name = r.take(name_length)?;
    let name = match raw_name.split_last() {
        Some((&0, name)) if !name.contains(&0) => {
            String::from_utf8(name.to_vec()).map_err(|_| DecodeError::BadName(id))?
        }
        _ => return Err(DecodeError::UnterminatedName(id)),
    };
    if name.is_empty() {
        return Err(DecodeError::BadName(id));
    }

    let flag_offset = r.pos;
    let body = match r.u8()? {
        DIRECTORY_FLAG => {
            let num_children = r.u32()?;
            let mut children = vec![];
            for _ in 0..num_children {
                let child = r.u64()?;
                let child = InodeId::try_from(child).map_err(|_| DecodeError::IdOverflow(child))?;
                children.push(child);
            }
            Body::Directory(children)
        }
        FILE_FLAG => {
            let size = r.u32()?;
            let num_blocks = r.u32()?;
            let mut blocks = vec![];
            for _ in 0..num_blocks {
                let block = r.u64()?;
                match BlockIndex::try_from(block) {
                    Ok(index) if index < NUM_BLOCKS => blocks.push(index),
                    _ => return Err(DecodeError::BadBlock { inode: id, block }),
                }
            }
            Body::File { size, blocks }
        }
        flag => {
            return Err(DecodeError::BadDirectoryFlag {
                offset: flag_offset,
                flag,
            })
        }
    };

    Ok(Record { id, name, body })
}

fn link(records: Vec<Record>) -> Result<Inode, DecodeError> {
    check_block_owners(&records)?;

    let mut records = records.into_iter();
    let root = records.next().ok_or(DecodeError::EmptyTable)?;
    let mut arena = HashMap::with_capacity(records.len());
    for record in records {
        let id = record.id;
        if id == root.id || arena.insert(id, record).is_some() {
            return Err(DecodeError::DuplicateRecord(id));
        }
    }

    let mut claimed = HashSet::new();
    claimed.insert(root.id);
    let root = build(root, &mut arena, &mut claimed)?;

    if let Some(orphan) = arena.keys().min() {
        return Err(DecodeError::Orphan(*orphan));
    }
    Ok(root)
}

fn check_block_owners(records: &[Record]) -> Result<(), DecodeError> {
    let mut owned = HashSet::new();
    for record in records {
        if let Body::File { blocks, .. } = &record.body {
            for &block in blocks {
                if !owned.insert(block) {
                    return Err(DecodeError::DuplicateBlock {
                        inode: record.id,
                        block,
                    });
                }
            }
        }
    }
    Ok(())
}

/// A directory whose children are still being built.
struct Pending {
    id: InodeId,
    name: String,
    child_ids: std::vec::IntoIter<InodeId>,
    children: Vec<Inode>,
}

/// Turns a file record into its inode, or pushes a directory record onto
/// `stack` to have its children built first.
fn open(record: Record, stack: &mut Vec<Pending>) -> Option<Inode> {
    match record.body {
        Body::File { size, blocks } => Some(Inode::file(record.id, record.name, size, blocks)),
        Body::Directory(child_ids) => {
            stack.push(Pending {
                id: record.id,
                name: record.name,
                children: Vec::with_capacity(child_ids.len()),
                child_ids: child_ids.into_iter(),
            });
            None
        }
    }
}

/// Resolves child ids depth first with an explicit stack, so nesting depth
/// is only bounded by memory.
fn build(
    root: Record,
    arena: &mut HashMap<InodeId, Record>,
    claimed: &mut HashSet<InodeId>,
) -> Result<Inode, DecodeError> {
    let root_id = root.id;
    let mut stack = vec![];
    let mut finished = open(root, &mut stack);

    while let Some(mut dir) = stack.pop() {
        if let Some(node) = finished.take() {
            dir.children.push(node);
        }
        match dir.child_ids.next() {
            Some(child) => {
                if !claimed.insert(child) {
                    return Err(DecodeError::DuplicateChild(child));
                }
                let record = arena.remove(&child).ok_or(DecodeError::UnknownChild {
                    parent: dir.id,
                    child,
                })?;
                stack.push(dir);
                finished = open(record, &mut stack);
            }
            None => finished = Some(Inode::directory(dir.id, dir.name, dir.children)),
        }
    }

    // The root is always the last node finished.
    finished.ok_or(DecodeError::DuplicateChild(root_id))
}
