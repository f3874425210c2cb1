//! Filesystem-type registration.
//!
//! A host keeps one registry of filesystem types it knows how to mount.
//! The engine contributes [`FS_TYPE`]; registering it makes `"myfs"`
//! mountable by name, unregistering it makes later mounts fail while
//! leaving existing mounts untouched.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::engine::Engine;
use crate::error::{FsError, FsResult};

/// Entry point that builds a mount from an option string.
pub type MountFn = fn(&str) -> FsResult<Engine>;

/// A mountable filesystem type.
#[derive(Debug, Clone, Copy)]
pub struct FsType {
    pub name: &'static str,
    pub mount: MountFn,
}

/// This engine's filesystem type.
pub const FS_TYPE: FsType = FsType {
    name: "myfs",
    mount: Engine::mount,
};

/// Name → filesystem type table.
#[derive(Debug, Default)]
pub struct FsTypeRegistry {
    types: RwLock<BTreeMap<&'static str, FsType>>,
}

impl FsTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `fs_type` mountable. Fails if the name is taken.
    pub fn register(&self, fs_type: FsType) -> FsResult<()> {
        let mut types = self.types.write();
        if types.contains_key(fs_type.name) {
            return Err(FsError::already_exists(fs_type.name));
        }
        types.insert(fs_type.name, fs_type);
        tracing::info!(fs_type = fs_type.name, "filesystem type registered");
        Ok(())
    }

    /// Remove a filesystem type. Existing mounts are unaffected.
    pub fn unregister(&self, name: &str) -> FsResult<()> {
        self.types
            .write()
            .remove(name)
            .map(|_| tracing::info!(fs_type = name, "filesystem type unregistered"))
            .ok_or_else(|| FsError::not_found(name))
    }

    /// Mount a registered type by name.
    pub fn mount(&self, name: &str, options: &str) -> FsResult<Engine> {
        let fs_type = self
            .types
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| FsError::not_found(format!("filesystem type {name}")))?;
        (fs_type.mount)(options)
    }

    /// Registered type names, sorted.
    pub fn list(&self) -> Vec<&'static str> {
        self.types.read().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_mount() {
        let registry = FsTypeRegistry::new();
        registry.register(FS_TYPE).unwrap();
        assert_eq!(registry.list(), vec!["myfs"]);

        let fs = registry.mount("myfs", "rsize=1024").unwrap();
        assert_eq!(fs.options().read_chunk_size, 1024);
    }

    #[test]
    fn test_duplicate_register() {
        let registry = FsTypeRegistry::new();
        registry.register(FS_TYPE).unwrap();
        assert!(matches!(
            registry.register(FS_TYPE),
            Err(FsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_unregister_blocks_new_mounts() {
        let registry = FsTypeRegistry::new();
        registry.register(FS_TYPE).unwrap();
        let existing = registry.mount("myfs", "").unwrap();

        registry.unregister("myfs").unwrap();
        assert!(matches!(
            registry.mount("myfs", ""),
            Err(FsError::NotFound(_))
        ));
        assert!(matches!(
            registry.unregister("myfs"),
            Err(FsError::NotFound(_))
        ));
        assert!(existing.root().is_ok());
    }
}
