//! Link and handle accounting.
//!
//! Every live node has two counters: `links`, the number of directory
//! entries naming it (plus the implicit `.` and child `..` references for
//! directories), and `handles`, the number of open references held by
//! callers. A node is destroyed exactly when both reach zero.
//!
//! Link counts only change under the superblock's exclusive lock. Handles
//! are also taken by lookups running under the shared lock, so the handle
//! counter is atomic; releasing one still requires the exclusive lock since
//! it may destroy the node.

use std::collections::HashMap;
use std::collections::TryReserveError;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{FsError, FsResult};
use crate::node::NodeId;

/// What the caller must do with a node after a counter changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Still reachable from the tree.
    Live,
    /// No directory entries left, kept alive by open handles.
    Orphaned,
    /// Both counters are zero; free the node now.
    Destroy,
}

#[derive(Debug, Default)]
struct Counts {
    links: u32,
    handles: AtomicU32,
}

impl Counts {
    fn disposition(&mut self) -> Disposition {
        match (self.links, *self.handles.get_mut()) {
            (0, 0) => Disposition::Destroy,
            (0, _) => Disposition::Orphaned,
            _ => Disposition::Live,
        }
    }
}

/// Reference counts for every node of one mount.
#[derive(Debug, Default)]
pub struct LinkRegistry {
    counts: HashMap<NodeId, Counts>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a freshly allocated node.
    pub fn register(&mut self, id: NodeId, links: u32) {
        self.counts.insert(
            id,
            Counts {
                links,
                handles: AtomicU32::new(0),
            },
        );
    }

    /// Make room for `additional` more nodes.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.counts.try_reserve(additional)
    }

    fn counts_mut(&mut self, id: NodeId) -> FsResult<&mut Counts> {
        self.counts
            .get_mut(&id)
            .ok_or_else(|| FsError::not_found(format!("node {id}")))
    }

    /// Add one link.
    pub fn link(&mut self, id: NodeId) -> FsResult<()> {
        let counts = self.counts_mut(id)?;
        counts.links += 1;
        Ok(())
    }

    /// Drop one link.
    pub fn unlink(&mut self, id: NodeId) -> FsResult<Disposition> {
        let counts = self.counts_mut(id)?;
        counts.links = counts.links.saturating_sub(1);
        Ok(counts.disposition())
    }

    /// Drop every link at once (directory removal: entry, `.` and so on).
    pub fn clear_links(&mut self, id: NodeId) -> FsResult<Disposition> {
        let counts = self.counts_mut(id)?;
        counts.links = 0;
        Ok(counts.disposition())
    }

    /// Take an open handle. Allowed under the shared lock.
    pub fn open(&self, id: NodeId) -> FsResult<()> {
        let counts = self
            .counts
            .get(&id)
            .ok_or_else(|| FsError::not_found(format!("node {id}")))?;
        counts.handles.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Release an open handle.
    pub fn close(&mut self, id: NodeId) -> FsResult<Disposition> {
        let counts = self.counts_mut(id)?;
        let handles = counts.handles.get_mut();
        *handles = handles.saturating_sub(1);
        Ok(counts.disposition())
    }

    /// Stop tracking a destroyed node.
    pub fn forget(&mut self, id: NodeId) {
        self.counts.remove(&id);
    }

    pub fn nlink(&self, id: NodeId) -> u32 {
        self.counts.get(&id).map_or(0, |c| c.links)
    }

    pub fn handles(&self, id: NodeId) -> u32 {
        self.counts
            .get(&id)
            .map_or(0, |c| c.handles.load(Ordering::Acquire))
    }

    /// Sum of open handles across all nodes.
    pub fn total_handles(&self) -> usize {
        self.counts
            .values()
            .map(|c| c.handles.load(Ordering::Acquire) as usize)
            .sum()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}
