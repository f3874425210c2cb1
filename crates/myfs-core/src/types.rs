//! Plain data types exchanged with the host.
//!
//! All of these are snapshots: they are copied out of the tree under the
//! lock and never alias engine state.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::node::NodeId;

/// Permission bits kept on a node.
pub const MODE_MASK: u32 = 0o7777;

/// Set-group-id bit. On a directory, new children inherit its gid.
pub const S_ISGID: u32 = 0o2000;

/// Node type tag.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
    /// Named pipe.
    Fifo,
    /// Unix socket.
    Socket,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }

    /// Returns true for device, fifo and socket nodes.
    pub fn is_special(&self) -> bool {
        matches!(
            self,
            FileType::CharDevice | FileType::BlockDevice | FileType::Fifo | FileType::Socket
        )
    }
}

/// Kind of special file created by `mknod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Char,
    Block,
    Fifo,
    Socket,
}

/// Device descriptor stored in a special node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub kind: DeviceKind,
    /// Device number (`major << 20 | minor` style, opaque to the engine).
    pub rdev: u64,
}

impl DeviceInfo {
    pub fn char_device(rdev: u64) -> Self {
        Self {
            kind: DeviceKind::Char,
            rdev,
        }
    }

    pub fn block_device(rdev: u64) -> Self {
        Self {
            kind: DeviceKind::Block,
            rdev,
        }
    }

    pub fn fifo() -> Self {
        Self {
            kind: DeviceKind::Fifo,
            rdev: 0,
        }
    }

    pub fn socket() -> Self {
        Self {
            kind: DeviceKind::Socket,
            rdev: 0,
        }
    }

    pub fn file_type(&self) -> FileType {
        match self.kind {
            DeviceKind::Char => FileType::CharDevice,
            DeviceKind::Block => FileType::BlockDevice,
            DeviceKind::Fifo => FileType::Fifo,
            DeviceKind::Socket => FileType::Socket,
        }
    }
}

/// Identity of the principal creating nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

impl Credentials {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// uid 0, gid 0.
    pub fn root() -> Self {
        Self::default()
    }
}

/// Node attributes (metadata snapshot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeAttr {
    /// Node id, stable for the life of the mount.
    pub id: NodeId,
    /// Node type.
    pub kind: FileType,
    /// Size in bytes. For directories, the synthetic entry-growth counter.
    pub size: u64,
    /// Permission bits (e.g., 0o644).
    pub perm: u32,
    /// Number of links, including `.` and child `..` for directories.
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    /// Device number for character and block devices, 0 otherwise.
    pub rdev: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl NodeAttr {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.kind.is_symlink()
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Node the entry names.
    pub id: NodeId,
    /// Entry type.
    pub kind: FileType,
}

/// Attributes to set (for setattr operation).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetAttr {
    /// New size (truncate/extend). Regular files only.
    pub size: Option<u64>,
    /// New permissions.
    pub perm: Option<u32>,
    /// New user ID.
    pub uid: Option<u32>,
    /// New group ID.
    pub gid: Option<u32>,
    /// New access time.
    pub atime: Option<SystemTime>,
    /// New modification time.
    pub mtime: Option<SystemTime>,
}

impl SetAttr {
    /// Create a new empty SetAttr.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set permissions.
    pub fn with_perm(mut self, perm: u32) -> Self {
        self.perm = Some(perm);
        self
    }

    /// Set owner and group.
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = Some(uid);
        self.gid = Some(gid);
        self
    }

    /// Set the modification time.
    pub fn with_mtime(mut self, mtime: SystemTime) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Set the access time.
    pub fn with_atime(mut self, atime: SystemTime) -> Self {
        self.atime = Some(atime);
        self
    }
}

/// Filesystem statistics.
///
/// Storage is memory-backed and unbounded, so the block and inode
/// counters are synthetic; only the sizes are meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatFs {
    /// Preferred I/O block size (the mount's write chunk size).
    pub bsize: u32,
    /// Fragment size (the content page size).
    pub frsize: u32,
    /// Total blocks.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Available blocks (to non-root).
    pub bavail: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub ffree: u64,
    /// Maximum name length.
    pub namelen: u32,
    /// Read chunk size in effect.
    pub rsize: u32,
    /// Write chunk size in effect.
    pub wsize: u32,
}
