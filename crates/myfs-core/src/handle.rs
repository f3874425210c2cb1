//! Open references to nodes.

use std::fmt;
use std::sync::Arc;

use crate::node::NodeId;
use crate::superblock::Superblock;

/// An open reference to a node.
///
/// While any handle exists the node is kept alive, even after its last
/// directory entry is removed. Dropping the final handle of an unlinked
/// node frees it immediately.
pub struct Handle {
    sb: Arc<Superblock>,
    id: NodeId,
}

impl Handle {
    /// Wrap a handle already counted in the link registry.
    pub(crate) fn adopt(sb: Arc<Superblock>, id: NodeId) -> Self {
        Self { sb, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl Clone for Handle {
    fn clone(&self) -> Self {
        let opened = self.sb.inspect(|tree| tree.links.open(self.id));
        if let Err(e) = opened {
            tracing::warn!(node = %self.id, "cloning handle of released node: {}", e);
        }
        Self::adopt(Arc::clone(&self.sb), self.id)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.sb.release(self.id);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.id).finish()
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.sb, &other.sb) && self.id == other.id
    }
}

impl Eq for Handle {}
