//! Nodes: the in-memory inodes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::dir::DirectoryTable;
use crate::page_store::PageStore;
use crate::types::{Credentials, DeviceInfo, FileType, MODE_MASK, NodeAttr};

/// Node identifier, assigned monotonically per mount and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Id of the root directory of every mount.
pub const ROOT_ID: NodeId = NodeId(1);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind-specific node content.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Directory(DirectoryTable),
    RegularFile(PageStore),
    /// Target path, stored verbatim.
    Symlink(String),
    Special(DeviceInfo),
}

impl NodeKind {
    pub fn file_type(&self) -> FileType {
        match self {
            NodeKind::Directory(_) => FileType::Directory,
            NodeKind::RegularFile(_) => FileType::File,
            NodeKind::Symlink(_) => FileType::Symlink,
            NodeKind::Special(dev) => dev.file_type(),
        }
    }
}

/// One node of the tree. Link counts live in the registry, not here.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Byte length for files and symlinks, entry-growth counter for
    /// directories, 0 for special nodes.
    pub size: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, mode: u32, owner: Credentials) -> Self {
        let now = SystemTime::now();
        let size = match &kind {
            NodeKind::Symlink(target) => target.len() as u64,
            _ => 0,
        };
        Self {
            id,
            kind,
            mode: mode & MODE_MASK,
            uid: owner.uid,
            gid: owner.gid,
            size,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    pub fn file_type(&self) -> FileType {
        self.kind.file_type()
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory(_))
    }

    pub fn as_dir(&self) -> Option<&DirectoryTable> {
        match &self.kind {
            NodeKind::Directory(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_dir_mut(&mut self) -> Option<&mut DirectoryTable> {
        match &mut self.kind {
            NodeKind::Directory(table) => Some(table),
            _ => None,
        }
    }

    /// Bump mtime and ctime to now.
    pub fn touch_modified(&mut self) {
        let now = SystemTime::now();
        self.mtime = now;
        self.ctime = now;
    }

    /// Bump ctime to now (metadata-only change).
    pub fn touch_changed(&mut self) {
        self.ctime = SystemTime::now();
    }

    /// Snapshot this node's attributes with the given link count.
    pub fn attr(&self, nlink: u32) -> NodeAttr {
        let rdev = match &self.kind {
            NodeKind::Special(dev) => dev.rdev,
            _ => 0,
        };
        NodeAttr {
            id: self.id,
            kind: self.file_type(),
            size: self.size,
            perm: self.mode,
            nlink,
            uid: self.uid,
            gid: self.gid,
            rdev,
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_masks_mode() {
        let node = Node::new(
            NodeId(2),
            NodeKind::RegularFile(PageStore::new()),
            0o100644,
            Credentials::new(1000, 100),
        );
        assert_eq!(node.mode, 0o644);
        assert_eq!(node.uid, 1000);
        assert_eq!(node.gid, 100);
        assert_eq!(node.file_type(), FileType::File);
    }

    #[test]
    fn test_symlink_size_is_target_len() {
        let node = Node::new(
            NodeId(3),
            NodeKind::Symlink("/a/b".into()),
            0o777,
            Credentials::root(),
        );
        assert_eq!(node.size, 4);
        assert!(node.as_dir().is_none());
    }

    #[test]
    fn test_attr_snapshot() {
        let node = Node::new(
            NodeId(4),
            NodeKind::Special(DeviceInfo::char_device(0x501)),
            0o600,
            Credentials::root(),
        );
        let attr = node.attr(1);
        assert_eq!(attr.kind, FileType::CharDevice);
        assert_eq!(attr.rdev, 0x501);
        assert_eq!(attr.nlink, 1);
        assert_eq!(NodeId(4).to_string(), "#4");
    }
}
