//! Human readable views of a tree and of the block allocation table. These
//! only read what they are given.
use crate::alloc::State;
use crate::node::Inode;
use std::fmt;

/// One line per inode in pre-order, indented two spaces per level.
///
/// ```text
/// / (id 0)
///   etc (id 1)
///     hosts (id 2 size 200b blocks 0 )
/// ```
pub struct TreeDump<'a>(pub &'a Inode);

impl fmt::Display for TreeDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (depth, node) in self.0.walk() {
            for _ in 0..depth {
                f.write_str("  ")?;
            }
            if node.is_directory() {
                writeln!(f, "{} (id {})", node.name(), node.id())?;
            } else {
                write!(
                    f,
                    "{} (id {} size {}b blocks ",
                    node.name(),
                    node.id(),
                    node.size()
                )?;
                for block in node.blocks() {
                    write!(f, "{} ", block)?;
                }
                writeln!(f, ")")?;
            }
        }
        Ok(())
    }
}

/// `Disk:` followed by one `0`/`1` digit per block.
pub struct BitmapDump<'a>(pub &'a [State]);

impl fmt::Display for BitmapDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Disk:")?;
        for state in self.0 {
            write!(f, "{}", state.as_byte())?;
        }
        writeln!(f)
    }
}

pub fn dump_tree(root: &Inode) -> String {
    TreeDump(root).to_string()
}

pub fn dump_bitmap(states: &[State]) -> String {
    BitmapDump(states).to_string()
}
