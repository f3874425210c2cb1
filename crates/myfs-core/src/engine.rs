//! The engine façade.
//!
//! [`Engine`] is what a host talks to: one value per mount, shared by
//! reference across any number of threads. Every operation resolves names
//! through directory tables starting at the node ids the caller passes,
//! and returns either its payload or an [`FsError`].
//!
//! Mutations are all-or-nothing: each one validates everything it needs
//! (names, kinds, emptiness, allocations) before committing the first
//! change.

use std::sync::Arc;

use crate::dir::{DIR_ENTRY_SIZE, DirectoryTable, is_dot_or_dotdot, validate_name};
use crate::error::{FsError, FsResult, MountOptionError};
use crate::handle::Handle;
use crate::host::HostCache;
use crate::node::{Node, NodeId, NodeKind, ROOT_ID};
use crate::options::{MountOptions, ParsedOptions};
use crate::page_store::PageStore;
use crate::superblock::{Superblock, Tree, UnmountStats};
use crate::types::{
    Credentials, DeviceInfo, DirEntry, FileType, MODE_MASK, NodeAttr, S_ISGID, SetAttr, StatFs,
};

/// What to create in [`Engine::create_node`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewNode {
    File,
    Directory,
    Symlink(String),
    Special(DeviceInfo),
}

/// A mounted filesystem.
pub struct Engine {
    sb: Arc<Superblock>,
    creds: Credentials,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("sb", &self.sb)
            .field("creds", &self.creds)
            .finish()
    }
}

impl Engine {
    /// Mount a new, empty filesystem.
    ///
    /// Bad options never fail the mount; see [`Engine::mount_warnings`].
    pub fn mount(options: &str) -> FsResult<Engine> {
        Self::mount_parsed(MountOptions::parse(options), None)
    }

    /// Mount with a host cache that is told about dirtied pages and
    /// evicted nodes.
    pub fn mount_with_host(options: &str, host: Arc<dyn HostCache>) -> FsResult<Engine> {
        Self::mount_parsed(MountOptions::parse(options), Some(host))
    }

    fn mount_parsed(parsed: ParsedOptions, host: Option<Arc<dyn HostCache>>) -> FsResult<Engine> {
        let creds = Credentials::root();
        let sb = Arc::new(Superblock::new(parsed, host, creds));
        tracing::info!(
            rsize = sb.options().read_chunk_size,
            wsize = sb.options().write_chunk_size,
            warnings = sb.warnings().len(),
            "myfs mounted"
        );
        Ok(Engine { sb, creds })
    }

    /// Use `creds` as owner of nodes created through this engine.
    pub fn with_credentials(mut self, creds: Credentials) -> Self {
        self.creds = creds;
        self
    }

    pub fn credentials(&self) -> Credentials {
        self.creds
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    pub fn options(&self) -> &MountOptions {
        self.sb.options()
    }

    /// Options rejected while mounting.
    pub fn mount_warnings(&self) -> &[MountOptionError] {
        self.sb.warnings()
    }

    /// Release every node and end the mount.
    ///
    /// Always succeeds. Handles still held by callers stay valid as values
    /// but refer to nothing; the count is reported so the host can decide
    /// whether that was a busy unmount.
    pub fn unmount(self) -> UnmountStats {
        let stats = self.sb.teardown();
        tracing::info!(
            released = stats.released,
            outstanding_handles = stats.outstanding_handles,
            "myfs unmounted"
        );
        stats
    }

    fn handle(&self, tree: &Tree, id: NodeId) -> FsResult<Handle> {
        tree.links.open(id)?;
        Ok(Handle::adopt(Arc::clone(&self.sb), id))
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Open a handle on the root directory.
    pub fn root(&self) -> FsResult<Handle> {
        self.open(ROOT_ID)
    }

    /// Open another handle on an existing node.
    pub fn open(&self, id: NodeId) -> FsResult<Handle> {
        self.sb.inspect(|tree| {
            tree.node(id)?;
            self.handle(tree, id)
        })
    }

    /// Look up `name` in directory `parent`.
    ///
    /// `.` and `..` are answered from the directory itself. A miss is
    /// always a fresh miss: nothing is cached or allocated for it.
    #[tracing::instrument(skip(self), name = "myfs.lookup")]
    pub fn lookup(&self, parent: NodeId, name: &str) -> FsResult<Handle> {
        self.sb.inspect(|tree| {
            let id = resolve_entry(tree, parent, name)?;
            self.handle(tree, id)
        })
    }

    /// Walk a `/`-separated path from the root. Symlinks are not followed.
    #[tracing::instrument(skip(self), name = "myfs.resolve")]
    pub fn resolve(&self, path: &str) -> FsResult<Handle> {
        self.sb.inspect(|tree| {
            let mut current = ROOT_ID;
            for component in path.split('/').filter(|c| !c.is_empty()) {
                current = resolve_entry(tree, current, component)?;
            }
            self.handle(tree, current)
        })
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Create a regular file.
    pub fn create(&self, parent: NodeId, name: &str, mode: u32) -> FsResult<Handle> {
        self.create_node(parent, name, NewNode::File, mode, self.creds)
    }

    /// Create a directory.
    pub fn mkdir(&self, parent: NodeId, name: &str, mode: u32) -> FsResult<Handle> {
        self.create_node(parent, name, NewNode::Directory, mode, self.creds)
    }

    /// Create a device, fifo or socket node.
    pub fn mknod(
        &self,
        parent: NodeId,
        name: &str,
        device: DeviceInfo,
        mode: u32,
    ) -> FsResult<Handle> {
        self.create_node(parent, name, NewNode::Special(device), mode, self.creds)
    }

    /// Create a symlink. The target is stored verbatim and never checked.
    pub fn symlink(&self, parent: NodeId, name: &str, target: &str) -> FsResult<Handle> {
        self.create_node(
            parent,
            name,
            NewNode::Symlink(target.to_string()),
            0o777,
            self.creds,
        )
    }

    /// Create any kind of node owned by `owner`.
    #[tracing::instrument(skip(self), name = "myfs.create")]
    pub fn create_node(
        &self,
        parent: NodeId,
        name: &str,
        kind: NewNode,
        mode: u32,
        owner: Credentials,
    ) -> FsResult<Handle> {
        validate_name(name)?;
        if is_dot_or_dotdot(name) {
            return Err(FsError::already_exists(name));
        }

        let id = self.sb.mutate(|tree| {
            let parent_node = tree.node(parent)?;
            let dir = tree.live_dir(parent)?;
            if dir.contains(name) {
                return Err(FsError::already_exists(name));
            }

            // Set-group-id directories hand their group down, and pass the
            // bit on to subdirectories.
            let inherit_group = parent_node.mode & S_ISGID != 0;
            let owner = if inherit_group {
                Credentials::new(owner.uid, parent_node.gid)
            } else {
                owner
            };

            tree.reserve_node()?;
            let id = tree.alloc_id();
            let (content, mode, links) = match kind {
                NewNode::File => (NodeKind::RegularFile(PageStore::new()), mode, 1),
                NewNode::Directory => {
                    let mode = if inherit_group { mode | S_ISGID } else { mode };
                    (NodeKind::Directory(DirectoryTable::new(parent)), mode, 2)
                }
                NewNode::Symlink(target) => (NodeKind::Symlink(target), 0o777, 1),
                NewNode::Special(dev) => (NodeKind::Special(dev), mode, 1),
            };
            let is_dir = matches!(content, NodeKind::Directory(_));
            let node = Node::new(id, content, mode, owner);

            tree.dir_mut(parent)?.insert(name, id)?;
            let parent_node = tree.node_mut(parent)?;
            parent_node.size += DIR_ENTRY_SIZE;
            parent_node.touch_modified();
            if is_dir {
                // The child's `..`.
                tree.links.link(parent)?;
            }
            tree.insert_node(node, links);
            tree.links.open(id)?;
            Ok(id)
        })?;

        tracing::debug!(node = %id, parent = %parent, name, "created");
        Ok(Handle::adopt(Arc::clone(&self.sb), id))
    }

    /// Add another name for an existing non-directory node.
    #[tracing::instrument(skip(self), name = "myfs.link")]
    pub fn link(&self, node: NodeId, new_parent: NodeId, new_name: &str) -> FsResult<Handle> {
        validate_name(new_name)?;
        if is_dot_or_dotdot(new_name) {
            return Err(FsError::already_exists(new_name));
        }

        self.sb.mutate(|tree| {
            if tree.node(node)?.is_dir() {
                return Err(FsError::permission_denied(format!(
                    "hard link to directory {node}"
                )));
            }
            if tree.links.nlink(node) == 0 {
                return Err(FsError::not_found(format!("node {node} (unlinked)")));
            }
            if tree.live_dir(new_parent)?.contains(new_name) {
                return Err(FsError::already_exists(new_name));
            }

            tree.dir_mut(new_parent)?.insert(new_name, node)?;
            let parent_node = tree.node_mut(new_parent)?;
            parent_node.size += DIR_ENTRY_SIZE;
            parent_node.touch_modified();
            tree.links.link(node)?;
            tree.links.open(node)?;
            tree.node_mut(node)?.touch_changed();
            Ok(())
        })?;

        Ok(Handle::adopt(Arc::clone(&self.sb), node))
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove a non-directory entry.
    ///
    /// The node is freed at once unless other links or open handles remain.
    #[tracing::instrument(skip(self), name = "myfs.unlink")]
    pub fn unlink(&self, parent: NodeId, name: &str) -> FsResult<()> {
        if is_dot_or_dotdot(name) {
            return Err(FsError::is_a_directory(name));
        }
        validate_name(name)?;

        self.sb.mutate(|tree| {
            let id = tree.dir(parent)?.lookup(name)?;
            if tree.node(id)?.is_dir() {
                return Err(FsError::is_a_directory(name));
            }

            tree.dir_mut(parent)?.remove(name)?;
            tree.node_mut(parent)?.touch_modified();
            tree.node_mut(id)?.touch_changed();
            let disposition = tree.links.unlink(id)?;
            tree.settle(id, disposition);
            Ok(())
        })
    }

    /// Remove an empty directory.
    #[tracing::instrument(skip(self), name = "myfs.rmdir")]
    pub fn rmdir(&self, parent: NodeId, name: &str) -> FsResult<()> {
        match name {
            "." => return Err(FsError::invalid_argument(name)),
            ".." => return Err(FsError::directory_not_empty(name)),
            _ => validate_name(name)?,
        }

        self.sb.mutate(|tree| {
            let id = tree.dir(parent)?.lookup(name)?;
            let victim = tree
                .node(id)?
                .as_dir()
                .ok_or_else(|| FsError::not_a_directory(name))?;
            if !victim.is_empty() {
                return Err(FsError::directory_not_empty(name));
            }

            tree.dir_mut(parent)?.remove(name)?;
            // The child's `..` no longer points at us.
            tree.links.unlink(parent)?;
            tree.node_mut(parent)?.touch_modified();
            tree.node_mut(id)?.touch_changed();
            let disposition = tree.links.clear_links(id)?;
            tree.settle(id, disposition);
            Ok(())
        })
    }

    /// Move `src_parent/src_name` to `dst_parent/dst_name`.
    ///
    /// An existing destination is replaced, provided kinds agree and a
    /// replaced directory is empty. The moved node keeps its id; a moved
    /// directory's `..` follows it to the new parent.
    #[tracing::instrument(skip(self), name = "myfs.rename")]
    pub fn rename(
        &self,
        src_parent: NodeId,
        src_name: &str,
        dst_parent: NodeId,
        dst_name: &str,
    ) -> FsResult<()> {
        for name in [src_name, dst_name] {
            validate_name(name)?;
            if is_dot_or_dotdot(name) {
                return Err(FsError::invalid_argument(name));
            }
        }

        self.sb.mutate(|tree| {
            let id = tree.dir(src_parent)?.lookup(src_name)?;
            let existing = tree.live_dir(dst_parent)?.lookup(dst_name).ok();
            if existing == Some(id) {
                // Same node under both names: nothing to do.
                return Ok(());
            }

            let moving_dir = tree.node(id)?.is_dir();
            let reparent = moving_dir && src_parent != dst_parent;
            if reparent {
                ensure_not_descendant(tree, dst_parent, id)?;
            }

            if let Some(victim) = existing {
                match (moving_dir, tree.node(victim)?.as_dir()) {
                    (true, None) => return Err(FsError::not_a_directory(dst_name)),
                    (false, Some(_)) => return Err(FsError::is_a_directory(dst_name)),
                    (true, Some(table)) if !table.is_empty() => {
                        return Err(FsError::directory_not_empty(dst_name));
                    }
                    _ => {}
                }
            }

            // Commit.
            let replaced = match existing {
                Some(victim) => {
                    tree.dir_mut(dst_parent)?.remove(dst_name)?;
                    tree.node_mut(victim)?.touch_changed();
                    let disposition = if tree.node(victim)?.is_dir() {
                        tree.links.unlink(dst_parent)?;
                        tree.links.clear_links(victim)?
                    } else {
                        tree.links.unlink(victim)?
                    };
                    Some((victim, disposition))
                }
                None => None,
            };

            tree.dir_mut(src_parent)?.remove(src_name)?;
            tree.dir_mut(dst_parent)?.insert(dst_name, id)?;
            if replaced.is_none() {
                tree.node_mut(dst_parent)?.size += DIR_ENTRY_SIZE;
            }

            if reparent {
                tree.links.unlink(src_parent)?;
                tree.links.link(dst_parent)?;
                if let Some(table) = tree.node_mut(id)?.as_dir_mut() {
                    table.set_parent(dst_parent);
                }
            }

            tree.node_mut(src_parent)?.touch_modified();
            tree.node_mut(dst_parent)?.touch_modified();
            tree.node_mut(id)?.touch_changed();

            if let Some((victim, disposition)) = replaced {
                tree.settle(victim, disposition);
            }
            Ok(())
        })
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Read up to `len` bytes at `offset` from a regular file.
    ///
    /// Copies in `read_chunk_size` steps. Reads never update atime.
    #[tracing::instrument(skip(self), name = "myfs.read")]
    pub fn read(&self, node: NodeId, offset: u64, len: usize) -> FsResult<Vec<u8>> {
        let chunk = self.sb.options().read_chunk_size as usize;
        self.sb.inspect(|tree| {
            let store = file_store(tree.node(node)?)?;

            let available = store.len().saturating_sub(offset);
            let mut out = Vec::with_capacity(len.min(available as usize));
            let mut pos = offset;
            while out.len() < len {
                let want = chunk.min(len - out.len());
                let part = store.read(pos, want);
                let got = part.len();
                out.extend_from_slice(&part);
                pos += got as u64;
                if got < want {
                    break;
                }
            }
            Ok(out)
        })
    }

    /// Write `bytes` at `offset` into a regular file.
    ///
    /// All pages the write needs are allocated up front, so either every
    /// byte lands or nothing changes. The host cache hears about dirtied
    /// blocks once per `write_chunk_size` chunk.
    #[tracing::instrument(skip(self, bytes), fields(len = bytes.len()), name = "myfs.write")]
    pub fn write(&self, node: NodeId, offset: u64, bytes: &[u8]) -> FsResult<usize> {
        let chunk = self.sb.options().write_chunk_size as usize;
        self.sb.mutate(|tree| {
            let target = tree.node_mut(node)?;
            let NodeKind::RegularFile(store) = &mut target.kind else {
                return Err(FsError::not_a_regular_file(format!("node {node}")));
            };
            if bytes.is_empty() {
                return Ok(0);
            }

            store.reserve(offset, bytes.len())?;
            let mut batches = Vec::new();
            let mut pos = offset;
            for piece in bytes.chunks(chunk) {
                pos += store.write(pos, piece)? as u64;
                batches.push(store.take_dirty());
            }
            tracing::trace!(node = %node, pages = store.allocated_pages(), "write committed");
            target.size = store.len();
            target.touch_modified();

            tree.pending
                .dirtied
                .extend(batches.into_iter().map(|pages| (node, pages)));
            Ok(bytes.len())
        })
    }

    /// Set a regular file's length, dropping or zero-filling content.
    pub fn truncate(&self, node: NodeId, size: u64) -> FsResult<()> {
        self.setattr(node, SetAttr::new().with_size(size)).map(|_| ())
    }

    /// Target of a symlink.
    pub fn readlink(&self, node: NodeId) -> FsResult<String> {
        self.sb.inspect(|tree| match &tree.node(node)?.kind {
            NodeKind::Symlink(target) => Ok(target.clone()),
            _ => Err(FsError::NotASymlink(format!("node {node}"))),
        })
    }

    /// List a directory, `.` and `..` first, then entries in name order.
    #[tracing::instrument(skip(self), name = "myfs.readdir")]
    pub fn readdir(&self, dir: NodeId) -> FsResult<Vec<DirEntry>> {
        self.sb.inspect(|tree| {
            let table = tree.dir(dir)?;
            let mut entries = Vec::with_capacity(table.len() + 2);
            entries.push(DirEntry {
                name: ".".into(),
                id: dir,
                kind: FileType::Directory,
            });
            entries.push(DirEntry {
                name: "..".into(),
                id: table.parent(),
                kind: FileType::Directory,
            });
            for (name, id) in table.iter() {
                entries.push(DirEntry {
                    name: name.to_string(),
                    id,
                    kind: tree.node(id)?.file_type(),
                });
            }
            Ok(entries)
        })
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    pub fn getattr(&self, node: NodeId) -> FsResult<NodeAttr> {
        self.sb
            .inspect(|tree| Ok(tree.node(node)?.attr(tree.links.nlink(node))))
    }

    /// Change size, permissions, ownership or times.
    #[tracing::instrument(skip(self), name = "myfs.setattr")]
    pub fn setattr(&self, node: NodeId, set: SetAttr) -> FsResult<NodeAttr> {
        self.sb.mutate(|tree| {
            let nlink = tree.links.nlink(node);
            let target = tree.node_mut(node)?;
            let is_dir = target.is_dir();
            let mut dirtied = Vec::new();

            // Size is the only fallible change; apply it first.
            if let Some(size) = set.size {
                let NodeKind::RegularFile(store) = &mut target.kind else {
                    return Err(if is_dir {
                        FsError::is_a_directory(format!("node {node}"))
                    } else {
                        FsError::not_a_regular_file(format!("node {node}"))
                    });
                };
                store.truncate(size)?;
                dirtied = store.take_dirty();
                target.size = size;
                target.touch_modified();
            }

            if let Some(perm) = set.perm {
                target.mode = perm & MODE_MASK;
            }
            if let Some(uid) = set.uid {
                target.uid = uid;
            }
            if let Some(gid) = set.gid {
                target.gid = gid;
            }
            if let Some(atime) = set.atime {
                target.atime = atime;
            }
            if let Some(mtime) = set.mtime {
                target.mtime = mtime;
            }
            target.touch_changed();
            let attr = target.attr(nlink);
            if !dirtied.is_empty() {
                tree.pending.dirtied.push((node, dirtied));
            }
            Ok(attr)
        })
    }

    pub fn statfs(&self) -> StatFs {
        self.sb.statfs()
    }

    /// Number of live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.sb
            .inspect(|tree| Ok(tree.node_count()))
            .unwrap_or_default()
    }

    /// `(links, open handles)` of a node; zeroes once it is gone.
    pub fn counts(&self, node: NodeId) -> (u32, u32) {
        self.sb
            .inspect(|tree| Ok((tree.links.nlink(node), tree.links.handles(node))))
            .unwrap_or_default()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.sb.teardown();
    }
}

/// Resolve one name in `parent`, synthesising `.` and `..`.
fn resolve_entry(tree: &Tree, parent: NodeId, name: &str) -> FsResult<NodeId> {
    let dir = tree.dir(parent)?;
    match name {
        "." => Ok(parent),
        ".." => Ok(dir.parent()),
        _ => {
            validate_name(name)?;
            dir.lookup(name)
        }
    }
}

fn file_store(node: &Node) -> FsResult<&PageStore> {
    match &node.kind {
        NodeKind::RegularFile(store) => Ok(store),
        _ => Err(FsError::not_a_regular_file(format!("node {}", node.id))),
    }
}

/// Fail if `dir` is `ancestor` or lies beneath it.
fn ensure_not_descendant(tree: &Tree, dir: NodeId, ancestor: NodeId) -> FsResult<()> {
    let mut current = dir;
    loop {
        if current == ancestor {
            return Err(FsError::invalid_argument(format!(
                "cannot move {ancestor} beneath itself"
            )));
        }
        if current == ROOT_ID {
            return Ok(());
        }
        current = tree.dir(current)?.parent();
    }
}
