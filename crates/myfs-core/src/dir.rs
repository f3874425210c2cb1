//! Directory tables.
//!
//! A directory maps entry names to node ids. The ids are non-owning:
//! which nodes stay alive is decided by the [`LinkRegistry`], not by the
//! table. `.` and `..` are never stored; lookups synthesise them from the
//! directory's own id and its recorded parent.
//!
//! [`LinkRegistry`]: crate::links::LinkRegistry

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::error::{FsError, FsResult};
use crate::node::NodeId;

/// Longest entry name accepted, in bytes.
pub const NAME_MAX: usize = 255;

/// Synthetic size added to a directory for every entry created in it.
///
/// Never subtracted on removal, so a directory's size only grows.
pub const DIR_ENTRY_SIZE: u64 = 20;

/// Check that `name` can be stored as a directory entry.
pub fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() {
        return Err(FsError::invalid_argument("empty name"));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(FsError::invalid_argument(name));
    }
    if name.len() > NAME_MAX {
        return Err(FsError::NameTooLong(name.to_string()));
    }
    Ok(())
}

/// Returns true for the two names every directory answers implicitly.
pub fn is_dot_or_dotdot(name: &str) -> bool {
    name == "." || name == ".."
}

/// Name → node mapping owned by one directory node.
#[derive(Debug, Clone)]
pub struct DirectoryTable {
    entries: BTreeMap<String, NodeId>,
    parent: NodeId,
}

impl DirectoryTable {
    /// Create an empty table whose `..` resolves to `parent`.
    pub fn new(parent: NodeId) -> Self {
        Self {
            entries: BTreeMap::new(),
            parent,
        }
    }

    /// Node that `..` resolves to. The root is its own parent.
    pub fn parent(&self) -> NodeId {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: NodeId) {
        self.parent = parent;
    }

    pub fn lookup(&self, name: &str) -> FsResult<NodeId> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| FsError::not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Add an entry. Fails if the name is already taken.
    pub fn insert(&mut self, name: &str, node: NodeId) -> FsResult<()> {
        validate_name(name)?;
        if is_dot_or_dotdot(name) {
            return Err(FsError::already_exists(name));
        }
        match self.entries.entry(name.to_string()) {
            Entry::Occupied(_) => Err(FsError::already_exists(name)),
            Entry::Vacant(slot) => {
                slot.insert(node);
                Ok(())
            }
        }
    }

    /// Remove an entry, returning the node it pointed to.
    pub fn remove(&mut self, name: &str) -> FsResult<NodeId> {
        self.entries
            .remove(name)
            .ok_or_else(|| FsError::not_found(name))
    }

    /// Number of stored entries (`.` and `..` excluded).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.entries.iter().map(|(name, id)| (name.as_str(), *id))
    }
}
