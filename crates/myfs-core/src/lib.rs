//! # myfs-core
//!
//! An in-memory hierarchical filesystem engine.
//!
//! Directories, regular files, symlinks and special nodes live entirely in
//! process memory and disappear on unmount. A host integration layer
//! (syscall translation, page cache, credential lookup) drives the engine
//! through [`Engine`] and is told about dirtied pages through
//! [`HostCache`].
//!
//! ## Model
//!
//! - [`Node`]s sit in a per-mount arena keyed by [`NodeId`].
//! - A directory's [`DirectoryTable`] maps names to ids without owning the
//!   nodes; the [`LinkRegistry`] counts directory references and open
//!   [`Handle`]s, and a node is freed the moment both reach zero.
//! - Regular file bytes live in a [`PageStore`] of fixed-size pages.
//! - The [`Superblock`] holds one reader/writer lock for the whole mount:
//!   lookups and reads share it, every mutation holds it exclusively.
//!
//! ```
//! use myfs_core::{Engine, ROOT_ID};
//!
//! let fs = Engine::mount("rsize=8192").unwrap();
//! let file = fs.create(ROOT_ID, "hello.txt", 0o644).unwrap();
//! fs.write(file.id(), 0, b"hi").unwrap();
//! assert_eq!(fs.read(file.id(), 0, 2).unwrap(), b"hi");
//! ```

pub mod dir;
pub mod engine;
mod error;
pub mod handle;
pub mod host;
pub mod links;
pub mod node;
pub mod options;
pub mod page_store;
pub mod registry;
pub mod superblock;
mod types;

pub use dir::{DIR_ENTRY_SIZE, DirectoryTable, NAME_MAX};
pub use engine::{Engine, NewNode};
pub use error::{FsError, FsResult, MountOptionError};
pub use handle::Handle;
pub use host::HostCache;
pub use links::{Disposition, LinkRegistry};
pub use node::{Node, NodeId, NodeKind, ROOT_ID};
pub use options::{DEFAULT_CHUNK_SIZE, MountOptions, ParsedOptions};
pub use page_store::{MAX_FILE_SIZE, PAGE_SIZE, PageStore};
pub use registry::{FS_TYPE, FsType, FsTypeRegistry, MountFn};
pub use superblock::{Superblock, UnmountStats};
pub use types::{
    Credentials, DeviceInfo, DeviceKind, DirEntry, FileType, MODE_MASK, NodeAttr, S_ISGID,
    SetAttr, StatFs,
};
