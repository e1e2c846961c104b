use crate::error::{FsError, Result};
use crate::{BlockIndex, InodeId, BLOCK_SIZE};
use log::{trace, warn};

/// Number of blocks reserved for a file of `size` bytes.
///
/// This is `size / BLOCK_SIZE + 1`, not a ceiling division: an empty file
/// still takes one block and a file of exactly one block takes two. Tables
/// written by earlier tools depend on it.
pub fn blocks_needed(size: u32) -> usize {
    size as usize / BLOCK_SIZE + 1
}

/// Names are stored NUL-terminated, so they can't be empty or contain NUL.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('\0') {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Issues inode identifiers. Ids only ever grow, so an id is never handed
/// out twice by the same counter. Once `InodeId::MAX` has been issued the
/// counter is exhausted.
#[derive(Debug)]
pub struct InodeIds {
    next: Option<InodeId>,
}

impl Default for InodeIds {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeIds {
    pub fn new() -> Self {
        Self { next: Some(0) }
    }

    pub fn next_id(&mut self) -> Result<InodeId> {
        let id = self.next.ok_or(FsError::IdsExhausted)?;
        self.next = id.checked_add(1);
        Ok(id)
    }

    /// The id the next call to `next_id` will return, `None` once exhausted.
    pub fn peek(&self) -> Option<InodeId> {
        self.next
    }

    /// Makes sure no id below `next` is issued again. Never moves backwards.
    pub fn reseed(&mut self, next: InodeId) {
        self.next = self.next.map(|current| current.max(next));
    }
}

#[derive(Debug)]
enum Kind {
    Directory { children: Vec<Inode> },
    File { size: u32, blocks: Vec<BlockIndex> },
}

/// A directory or a file. A directory owns its children outright; nothing
/// points back up the tree, so the only way to reach a node is down from one
/// of its ancestors.
#[derive(Debug)]
pub struct Inode {
    id: InodeId,
    name: String,
    kind: Kind,
}

impl Inode {
    pub(crate) fn directory(id: InodeId, name: String, children: Vec<Inode>) -> Self {
        Self {
            id,
            name,
            kind: Kind::Directory { children },
        }
    }

    pub(crate) fn file(id: InodeId, name: String, size: u32, blocks: Vec<BlockIndex>) -> Self {
        Self {
            id,
            name,
            kind: Kind::File { size, blocks },
        }
    }

    pub fn id(&self) -> InodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, Kind::Directory { .. })
    }

    /// Children in insertion order. Always empty for files.
    pub fn children(&self) -> &[Inode] {
        match &self.kind {
            Kind::Directory { children } => children,
            Kind::File { .. } => &[],
        }
    }

    pub fn num_children(&self) -> usize {
        self.children().len()
    }

    /// File size in bytes. Directories have size 0.
    pub fn size(&self) -> u32 {
        match &self.kind {
            Kind::File { size, .. } => *size,
            Kind::Directory { .. } => 0,
        }
    }

    /// Blocks owned by a file, in file order. Always empty for directories.
    pub fn blocks(&self) -> &[BlockIndex] {
        match &self.kind {
            Kind::File { blocks, .. } => blocks,
            Kind::Directory { .. } => &[],
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks().len()
    }

    /// Finds a direct child by name. Does not descend into subdirectories.
    /// Returns `None` when called on a file.
    pub fn find_by_name(&self, name: &str) -> Option<&Inode> {
        if !self.is_directory() {
            warn!("Inode {} ({}) is not a directory.", self.id, self.name);
            return None;
        }
        self.children().iter().find(|child| child.name == name)
    }

    pub fn find_by_name_mut(&mut self, name: &str) -> Option<&mut Inode> {
        match &mut self.kind {
            Kind::Directory { children } => children.iter_mut().find(|child| child.name == name),
            Kind::File { .. } => {
                warn!("Inode {} ({}) is not a directory.", self.id, self.name);
                None
            }
        }
    }

    /// Walks `path` one `find_by_name` at a time. An empty path is `self`.
    pub fn lookup_path(&self, path: &[&str]) -> Option<&Inode> {
        path.iter()
            .try_fold(self, |node, part| node.find_by_name(part))
    }

    pub fn lookup_path_mut(&mut self, path: &[&str]) -> Option<&mut Inode> {
        let mut node = self;
        for part in path {
            node = node.find_by_name_mut(part)?;
        }
        Some(node)
    }

    pub(crate) fn child(&self, id: InodeId) -> Option<&Inode> {
        self.children().iter().find(|child| child.id == id)
    }

    /// Appends `child` as the last child of this directory.
    pub(crate) fn attach(&mut self, child: Inode) -> Result<&mut Inode> {
        match &mut self.kind {
            Kind::Directory { children } => {
                let pos = children.len();
                children.push(child);
                Ok(&mut children[pos])
            }
            Kind::File { .. } => Err(FsError::NotADirectory(self.id)),
        }
    }

    /// Removes the direct child `id`, keeping the order of its siblings.
    pub(crate) fn detach(&mut self, id: InodeId) -> Result<Inode> {
        let parent = self.id;
        match &mut self.kind {
            Kind::Directory { children } => {
                let pos = children
                    .iter()
                    .position(|child| child.id == id)
                    .ok_or(FsError::NotDirectChild { parent, child: id })?;
                Ok(children.remove(pos))
            }
            Kind::File { .. } => Err(FsError::NotADirectory(parent)),
        }
    }

    /// Pre-order walk over this node and everything below it, yielding each
    /// node with its depth relative to `self`.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(0, self)],
        }
    }

    /// Largest id in this subtree.
    pub fn max_id(&self) -> InodeId {
        self.walk().map(|(_, node)| node.id).max().unwrap_or(self.id)
    }

    /// Releases every node of the tree, children before their parent, and
    /// returns how many were released. Blocks owned by files are left
    /// allocated: this drops the in-memory copy of a tree that has already
    /// been saved, it does not delete anything from the disk.
    pub fn teardown(self) -> usize {
        let mut released = 0;
        let mut stack = vec![(self, false)];
        while let Some((mut node, expanded)) = stack.pop() {
            if !expanded {
                let children = match &mut node.kind {
                    Kind::Directory { children } => std::mem::take(children),
                    Kind::File { .. } => vec![],
                };
                stack.push((node, true));
                stack.extend(children.into_iter().rev().map(|child| (child, false)));
                continue;
            }
            trace!("Releasing inode {} ({}).", node.id, node.name);
            released += 1;
        }
        released
    }
}

/// Two trees are equal when they have the same shape and every node matches
/// in id, name, kind, size and blocks.
impl PartialEq for Inode {
    fn eq(&self, other: &Self) -> bool {
        type Entry<'a> = (usize, InodeId, &'a str, bool, u32, &'a [BlockIndex]);

        fn entry((depth, node): (usize, &Inode)) -> Entry<'_> {
            let name = node.name.as_str();
            (depth, node.id, name, node.is_directory(), node.size(), node.blocks())
        }
        self.walk().map(entry).eq(other.walk().map(entry))
    }
}

impl Drop for Inode {
    fn drop(&mut self) {
        // Children are detached before they are dropped, so dropping a deep
        // tree never nests.
        let mut pending = match &mut self.kind {
            Kind::Directory { children } => std::mem::take(children),
            Kind::File { .. } => return,
        };
        while let Some(mut node) = pending.pop() {
            if let Kind::Directory { children } = &mut node.kind {
                pending.append(children);
            }
        }
    }
}

pub struct Walk<'a> {
    stack: Vec<(usize, &'a Inode)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a Inode);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        self.stack
            .extend(node.children().iter().rev().map(|child| (depth + 1, child)));
        Some((depth, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Inode {
        let mut root = Inode::directory(0, "/".to_string(), vec![]);
        let etc = root
            .attach(Inode::directory(1, "etc".to_string(), vec![]))
            .unwrap();
        etc.attach(Inode::file(2, "hosts".to_string(), 200, vec![0]))
            .unwrap();
        root.attach(Inode::file(3, "kernel".to_string(), 20000, vec![1, 2, 3, 4, 5]))
            .unwrap();
        root
    }

    #[test]
    fn block_count_adds_one_block_to_integer_division() {
        assert_eq!(blocks_needed(0), 1);
        assert_eq!(blocks_needed(200), 1);
        assert_eq!(blocks_needed(4095), 1);
        assert_eq!(blocks_needed(4096), 2);
        assert_eq!(blocks_needed(20000), 5);
        assert_eq!(blocks_needed(50000), 13);
    }

    #[test]
    fn names_must_be_non_empty_without_nul() {
        assert!(validate_name("hosts").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("ho\0sts").is_err());
    }

    #[test]
    fn ids_are_monotonic_and_reseed_never_moves_back() {
        let mut ids = InodeIds::new();
        assert_eq!(ids.next_id().unwrap(), 0);
        assert_eq!(ids.next_id().unwrap(), 1);

        ids.reseed(10);
        assert_eq!(ids.next_id().unwrap(), 10);

        ids.reseed(3);
        assert_eq!(ids.peek(), Some(11));
    }

    #[test]
    fn last_id_is_issued_once_then_counter_is_exhausted() {
        let mut ids = InodeIds::new();
        ids.reseed(InodeId::MAX);

        assert_eq!(ids.next_id().unwrap(), InodeId::MAX);
        assert_eq!(ids.peek(), None);
        assert!(matches!(ids.next_id(), Err(FsError::IdsExhausted)));
        ids.reseed(5);
        assert!(matches!(ids.next_id(), Err(FsError::IdsExhausted)));
    }

    #[test]
    fn find_by_name_only_sees_direct_children() {
        let root = sample_tree();

        assert_eq!(root.find_by_name("etc").unwrap().id(), 1);
        assert_eq!(root.find_by_name("kernel").unwrap().num_blocks(), 5);
        assert!(root.find_by_name("hosts").is_none());
    }

    #[test]
    fn find_by_name_on_file_is_none() {
        let root = sample_tree();
        let kernel = root.find_by_name("kernel").unwrap();

        assert!(kernel.find_by_name("anything").is_none());
    }

    #[test]
    fn lookup_path_walks_components() {
        let mut root = sample_tree();

        let hosts = root.lookup_path(&["etc", "hosts"]).unwrap();
        assert_eq!(hosts.size(), 200);
        assert_eq!(root.lookup_path(&[]).unwrap().id(), 0);
        assert!(root.lookup_path(&["etc", "hosts", "x"]).is_none());
        assert!(root.lookup_path_mut(&["etc"]).unwrap().is_directory());
    }

    #[test]
    fn detach_keeps_sibling_order() {
        let mut root = Inode::directory(0, "/".to_string(), vec![]);
        for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
            root.attach(Inode::directory(id, name.to_string(), vec![]))
                .unwrap();
        }

        let removed = root.detach(2).unwrap();
        assert_eq!(removed.name(), "b");
        let names: Vec<&str> = root.children().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn detach_of_non_child_fails() {
        let mut root = sample_tree();

        match root.detach(2).unwrap_err() {
            FsError::NotDirectChild { parent: 0, child: 2 } => (),
            e => panic!("unexpected error: {:?}", e),
        }
        assert_eq!(root.num_children(), 2);
    }

    #[test]
    fn attach_below_file_fails() {
        let mut file = Inode::file(7, "f".to_string(), 0, vec![0]);

        match file.attach(Inode::directory(8, "d".to_string(), vec![])) {
            Err(FsError::NotADirectory(7)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn walk_is_pre_order_with_depth() {
        let root = sample_tree();

        let visited: Vec<(usize, &str)> = root.walk().map(|(d, n)| (d, n.name())).collect();
        assert_eq!(
            visited,
            vec![(0, "/"), (1, "etc"), (2, "hosts"), (1, "kernel")]
        );
        assert_eq!(root.max_id(), 3);
    }

    fn chain(depth: u32) -> Inode {
        let mut node = Inode::file(depth, "leaf".to_string(), 0, vec![0]);
        for id in (0..depth).rev() {
            node = Inode::directory(id, format!("d{}", id), vec![node]);
        }
        node
    }

    #[test]
    fn deep_tree_compares_and_drops_without_overflow() {
        let deep = chain(100_000);
        assert_eq!(deep.walk().count(), 100_001);
        assert!(deep == chain(100_000));
        assert!(deep != chain(99_999));
        drop(deep);
    }

    #[test]
    fn equality_sees_shape_not_only_order() {
        // Same pre-order sequence of nodes, different nesting.
        let nested = Inode::directory(
            0,
            "/".to_string(),
            vec![Inode::directory(
                1,
                "a".to_string(),
                vec![Inode::directory(2, "b".to_string(), vec![])],
            )],
        );
        let flat = Inode::directory(
            0,
            "/".to_string(),
            vec![
                Inode::directory(1, "a".to_string(), vec![]),
                Inode::directory(2, "b".to_string(), vec![]),
            ],
        );
        assert!(nested != flat);
        assert!(sample_tree() == sample_tree());
    }

    #[test]
    fn teardown_releases_every_node() {
        assert_eq!(sample_tree().teardown(), 4);
        assert_eq!(Inode::directory(0, "/".to_string(), vec![]).teardown(), 1);
    }
}
