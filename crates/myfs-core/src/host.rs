//! Callbacks from the engine to the host.

use crate::node::NodeId;

/// Host-side cache that mirrors engine content.
///
/// Callbacks run after the engine has released its lock, in the order the
/// changes were committed, so a callback may call back into the engine.
pub trait HostCache: Send + Sync {
    /// Blocks of `node` became dirty. Indices are in `PAGE_SIZE` units.
    fn pages_dirtied(&self, node: NodeId, pages: &[u64]);

    /// `node` was destroyed; drop anything cached for it.
    fn node_evicted(&self, node: NodeId) {
        let _ = node;
    }
}
