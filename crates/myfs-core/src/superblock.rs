//! Per-mount state.
//!
//! The superblock owns everything one mount has: its options, the node
//! arena with the link registry, and the single reader/writer lock that
//! serialises mutations. Operations that only look (lookup, read, readdir,
//! getattr, statfs) take the lock shared; everything else takes it
//! exclusively for the whole operation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::dir::{DirectoryTable, NAME_MAX};
use crate::error::{FsError, FsResult, MountOptionError};
use crate::host::HostCache;
use crate::links::{Disposition, LinkRegistry};
use crate::node::{Node, NodeId, NodeKind, ROOT_ID};
use crate::options::{MountOptions, ParsedOptions};
use crate::page_store::PAGE_SIZE;
use crate::types::{Credentials, StatFs};

/// Permission bits of the root directory.
pub const ROOT_MODE: u32 = 0o755;

/// What an unmount released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnmountStats {
    /// Nodes freed by the teardown, root included.
    pub released: usize,
    /// Handles still held by callers at teardown time.
    pub outstanding_handles: usize,
}

/// Host notifications produced by a mutation, delivered after unlock.
#[derive(Debug, Default)]
pub(crate) struct Pending {
    pub dirtied: Vec<(NodeId, Vec<u64>)>,
    pub evicted: Vec<NodeId>,
}

/// Node arena and link registry, guarded by the superblock lock.
#[derive(Debug)]
pub(crate) struct Tree {
    nodes: HashMap<NodeId, Node>,
    pub links: LinkRegistry,
    next_id: u64,
    mounted: bool,
    pub pending: Pending,
}

impl Tree {
    fn new(owner: Credentials) -> Self {
        let mut nodes = HashMap::new();
        let root = Node::new(
            ROOT_ID,
            NodeKind::Directory(DirectoryTable::new(ROOT_ID)),
            ROOT_MODE,
            owner,
        );
        nodes.insert(ROOT_ID, root);

        let mut links = LinkRegistry::new();
        // Root's entry in the host's mount point plus its own `.`.
        links.register(ROOT_ID, 2);

        Self {
            nodes,
            links,
            next_id: ROOT_ID.0 + 1,
            mounted: true,
            pending: Pending::default(),
        }
    }

    /// Hand out the next node id. Ids are never reused within a mount.
    pub fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Make room for one more node so the commit step cannot fail.
    pub fn reserve_node(&mut self) -> FsResult<()> {
        self.nodes
            .try_reserve(1)
            .map_err(|_| FsError::OutOfMemory)?;
        self.links.try_reserve(1).map_err(|_| FsError::OutOfMemory)
    }

    pub fn insert_node(&mut self, node: Node, links: u32) {
        self.links.register(node.id, links);
        self.nodes.insert(node.id, node);
    }

    pub fn node(&self, id: NodeId) -> FsResult<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| FsError::not_found(format!("node {id}")))
    }

    pub fn node_mut(&mut self, id: NodeId) -> FsResult<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| FsError::not_found(format!("node {id}")))
    }

    pub fn dir(&self, id: NodeId) -> FsResult<&DirectoryTable> {
        self.node(id)?
            .as_dir()
            .ok_or_else(|| FsError::not_a_directory(format!("node {id}")))
    }

    pub fn dir_mut(&mut self, id: NodeId) -> FsResult<&mut DirectoryTable> {
        self.node_mut(id)?
            .as_dir_mut()
            .ok_or_else(|| FsError::not_a_directory(format!("node {id}")))
    }

    /// Directory that may still receive entries: exists and has not been
    /// removed from the tree.
    pub fn live_dir(&self, id: NodeId) -> FsResult<&DirectoryTable> {
        let dir = self.dir(id)?;
        if self.links.nlink(id) == 0 {
            return Err(FsError::not_found(format!("node {id} (removed)")));
        }
        Ok(dir)
    }

    /// Free `id` if its counters say so. Returns true if it was destroyed.
    pub fn settle(&mut self, id: NodeId, disposition: Disposition) -> bool {
        match disposition {
            Disposition::Destroy => {
                self.nodes.remove(&id);
                self.links.forget(id);
                self.pending.evicted.push(id);
                tracing::debug!(node = %id, "node destroyed");
                true
            }
            Disposition::Orphaned => {
                tracing::debug!(node = %id, "node unlinked while open");
                false
            }
            Disposition::Live => false,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Release every node regardless of link counts. Idempotent.
    fn teardown(&mut self) -> UnmountStats {
        if !self.mounted {
            return UnmountStats::default();
        }
        let stats = UnmountStats {
            released: self.nodes.len(),
            outstanding_handles: self.links.total_handles(),
        };
        self.nodes.clear();
        self.links.clear();
        self.pending = Pending::default();
        self.mounted = false;
        stats
    }
}

/// Per-mount root context.
pub struct Superblock {
    options: MountOptions,
    warnings: Vec<MountOptionError>,
    host: Option<Arc<dyn HostCache>>,
    tree: RwLock<Tree>,
}

impl fmt::Debug for Superblock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Superblock")
            .field("options", &self.options)
            .field("warnings", &self.warnings)
            .field("host", &self.host.as_ref().map(|_| "<host cache>"))
            .field("tree", &"<locked>")
            .finish()
    }
}

impl Superblock {
    pub(crate) fn new(
        parsed: ParsedOptions,
        host: Option<Arc<dyn HostCache>>,
        owner: Credentials,
    ) -> Self {
        Self {
            options: parsed.options,
            warnings: parsed.warnings,
            host,
            tree: RwLock::new(Tree::new(owner)),
        }
    }

    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    /// Options rejected at mount time.
    pub fn warnings(&self) -> &[MountOptionError] {
        &self.warnings
    }

    /// Run `f` under the shared lock.
    pub(crate) fn inspect<T>(&self, f: impl FnOnce(&Tree) -> FsResult<T>) -> FsResult<T> {
        let tree = self.tree.read();
        f(&tree)
    }

    /// Run `f` under the exclusive lock, then deliver host notifications.
    pub(crate) fn mutate<T>(&self, f: impl FnOnce(&mut Tree) -> FsResult<T>) -> FsResult<T> {
        let (result, pending) = {
            let mut tree = self.tree.write();
            let result = f(&mut tree);
            (result, std::mem::take(&mut tree.pending))
        };
        self.notify(pending);
        result
    }

    fn notify(&self, pending: Pending) {
        let Some(host) = &self.host else {
            return;
        };
        for (node, pages) in &pending.dirtied {
            host.pages_dirtied(*node, pages);
        }
        for node in pending.evicted {
            host.node_evicted(node);
        }
    }

    /// Drop one handle on `id`, destroying the node if it was unlinked.
    pub(crate) fn release(&self, id: NodeId) {
        let result = self.mutate(|tree| {
            if !tree.is_mounted() {
                return Ok(());
            }
            let disposition = tree.links.close(id)?;
            tree.settle(id, disposition);
            Ok(())
        });
        if let Err(e) = result {
            tracing::warn!(node = %id, "release of untracked handle: {}", e);
        }
    }

    pub fn statfs(&self) -> StatFs {
        StatFs {
            bsize: self.options.write_chunk_size,
            frsize: PAGE_SIZE as u32,
            blocks: u64::MAX,
            bfree: u64::MAX,
            bavail: u64::MAX,
            files: u64::MAX,
            ffree: u64::MAX,
            namelen: NAME_MAX as u32,
            rsize: self.options.read_chunk_size,
            wsize: self.options.write_chunk_size,
        }
    }

    pub(crate) fn teardown(&self) -> UnmountStats {
        self.tree.write().teardown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_tree_has_root() {
        let sb = Superblock::new(ParsedOptions::default(), None, Credentials::root());
        sb.inspect(|tree| {
            let root = tree.node(ROOT_ID)?;
            assert!(root.is_dir());
            assert_eq!(root.mode, ROOT_MODE);
            assert_eq!(tree.links.nlink(ROOT_ID), 2);
            assert_eq!(tree.dir(ROOT_ID)?.parent(), ROOT_ID);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_ids_are_monotonic() {
        let sb = Superblock::new(ParsedOptions::default(), None, Credentials::root());
        let (a, b) = sb
            .mutate(|tree| Ok((tree.alloc_id(), tree.alloc_id())))
            .unwrap();
        assert_eq!(a, NodeId(2));
        assert_eq!(b, NodeId(3));
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let sb = Superblock::new(ParsedOptions::default(), None, Credentials::root());
        let first = sb.teardown();
        assert_eq!(first.released, 1);
        assert_eq!(sb.teardown(), UnmountStats::default());
        // Releasing after teardown is a no-op rather than an error.
        sb.release(ROOT_ID);
    }

    #[test]
    fn test_statfs_reflects_options() {
        let parsed = MountOptions::parse("wsize=65536");
        let sb = Superblock::new(parsed, None, Credentials::root());
        let st = sb.statfs();
        assert_eq!(st.bsize, 65536);
        assert_eq!(st.wsize, 65536);
        assert_eq!(st.rsize, 4096);
        assert_eq!(st.frsize, 4096);
        assert_eq!(st.namelen, 255);
    }
}
