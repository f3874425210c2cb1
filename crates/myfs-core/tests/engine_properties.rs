//! End-to-end behaviour of the engine façade.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, SystemTime};

use myfs_core::{
    DEFAULT_CHUNK_SIZE, Engine, FsError, FsResult, FsTypeRegistry, FS_TYPE, MountOptionError,
    NAME_MAX, NodeAttr, ROOT_ID,
};
use tracing_subscriber::EnvFilter;

/// Mount with a test subscriber installed; `RUST_LOG=myfs_core=debug`
/// shows engine events for a failing test.
fn mount(options: &str) -> FsResult<Engine> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Engine::mount(options)
}

/// Let the clock move so timestamp comparisons are strict.
fn tick() {
    thread::sleep(Duration::from_millis(20));
}

fn times(attr: &NodeAttr) -> (SystemTime, SystemTime, SystemTime) {
    (attr.atime, attr.mtime, attr.ctime)
}

fn entry_count(fs: &Engine, dir: myfs_core::NodeId) -> usize {
    // Minus `.` and `..`.
    fs.readdir(dir).unwrap().len() - 2
}

#[test]
fn test_entry_count_tracks_create_and_unlink() {
    let fs = mount("").unwrap();
    let dir = fs.mkdir(ROOT_ID, "work", 0o755).unwrap();

    let mut created = 0;
    let mut unlinked = 0;
    let script = [
        ("c", "a"),
        ("c", "b"),
        ("c", "a"), // duplicate
        ("u", "a"),
        ("u", "a"), // already gone
        ("c", "c"),
        ("u", "zz"), // never existed
        ("c", "a"),
    ];
    for (op, name) in script {
        match op {
            "c" => {
                if fs.create(dir.id(), name, 0o644).is_ok() {
                    created += 1;
                }
            }
            _ => {
                if fs.unlink(dir.id(), name).is_ok() {
                    unlinked += 1;
                }
            }
        }
    }

    assert_eq!(created, 4);
    assert_eq!(unlinked, 1);
    assert_eq!(entry_count(&fs, dir.id()), created - unlinked);
}

#[test]
fn test_write_read_round_trip() {
    let fs = mount("").unwrap();
    let f = fs.create(ROOT_ID, "blob", 0o644).unwrap();

    let payload: Vec<u8> = (0..3 * DEFAULT_CHUNK_SIZE as usize + 17)
        .map(|i| (i * 31 % 251) as u8)
        .collect();
    assert_eq!(fs.write(f.id(), 0, &payload).unwrap(), payload.len());
    assert_eq!(fs.read(f.id(), 0, payload.len()).unwrap(), payload);
    assert_eq!(fs.getattr(f.id()).unwrap().size, payload.len() as u64);

    let empty = fs.create(ROOT_ID, "empty", 0o644).unwrap();
    assert_eq!(fs.write(empty.id(), 0, b"").unwrap(), 0);
    assert!(fs.read(empty.id(), 0, 0).unwrap().is_empty());
}

#[test]
fn test_mkdir_twice_fails() {
    let fs = mount("").unwrap();
    fs.mkdir(ROOT_ID, "d", 0o755).unwrap();
    let before = entry_count(&fs, ROOT_ID);

    assert!(matches!(
        fs.mkdir(ROOT_ID, "d", 0o755),
        Err(FsError::AlreadyExists(_))
    ));
    assert_eq!(entry_count(&fs, ROOT_ID), before);
}

#[test]
fn test_rmdir_link_accounting() {
    let fs = mount("").unwrap();
    let parent = fs.mkdir(ROOT_ID, "p", 0o755).unwrap();
    let child = fs.mkdir(parent.id(), "c", 0o755).unwrap();
    fs.create(child.id(), "f", 0o644).unwrap();

    assert!(matches!(
        fs.rmdir(parent.id(), "c"),
        Err(FsError::DirectoryNotEmpty(_))
    ));

    fs.unlink(child.id(), "f").unwrap();
    let before = fs.getattr(parent.id()).unwrap().nlink;
    fs.rmdir(parent.id(), "c").unwrap();
    assert_eq!(fs.getattr(parent.id()).unwrap().nlink, before - 1);
}

#[test]
fn test_unlink_twice_is_not_found() {
    let fs = mount("").unwrap();
    fs.create(ROOT_ID, "f", 0o644).unwrap();
    fs.unlink(ROOT_ID, "f").unwrap();
    assert!(matches!(
        fs.unlink(ROOT_ID, "f"),
        Err(FsError::NotFound(_))
    ));
}

#[test]
fn test_rename_across_directories_keeps_content() {
    let fs = mount("").unwrap();
    let a = fs.mkdir(ROOT_ID, "dirA", 0o755).unwrap();
    let b = fs.mkdir(ROOT_ID, "dirB", 0o755).unwrap();

    let f = fs.create(a.id(), "f", 0o644).unwrap();
    fs.write(f.id(), 0, b"hi").unwrap();
    let original = f.id();
    drop(f);

    fs.rename(a.id(), "f", b.id(), "g").unwrap();

    let g = fs.lookup(b.id(), "g").unwrap();
    assert_eq!(g.id(), original);
    assert_eq!(fs.read(g.id(), 0, 2).unwrap(), b"hi");
    assert_eq!(fs.getattr(g.id()).unwrap().nlink, 1);
    assert!(matches!(fs.lookup(a.id(), "f"), Err(FsError::NotFound(_))));
}

#[test]
fn test_unlinked_node_lives_until_handle_closed() {
    let fs = mount("").unwrap();
    let handle = fs.create(ROOT_ID, "tmp", 0o644).unwrap();
    fs.write(handle.id(), 0, b"still here").unwrap();
    let id = handle.id();

    fs.unlink(ROOT_ID, "tmp").unwrap();
    assert!(matches!(fs.lookup(ROOT_ID, "tmp"), Err(FsError::NotFound(_))));
    assert_eq!(fs.counts(id), (0, 1));
    assert_eq!(fs.read(id, 0, 100).unwrap(), b"still here");

    // A second handle keeps it alive past the first close.
    let second = handle.clone();
    drop(handle);
    assert_eq!(fs.read(id, 0, 5).unwrap(), b"still");

    drop(second);
    assert!(matches!(fs.getattr(id), Err(FsError::NotFound(_))));
    assert_eq!(fs.node_count(), 1);
}

#[test]
fn test_mount_option_warnings() {
    let fs = mount("rsize=4096,bogus=1,wsize=abc").unwrap();
    assert_eq!(fs.options().read_chunk_size, 4096);
    assert_eq!(fs.options().write_chunk_size, DEFAULT_CHUNK_SIZE);

    let keys: Vec<_> = fs.mount_warnings().iter().map(|w| w.key()).collect();
    assert_eq!(keys, vec!["bogus", "wsize"]);
    assert!(matches!(
        fs.mount_warnings()[1],
        MountOptionError::Malformed { .. }
    ));
}

#[test]
fn test_name_too_long() {
    let fs = mount("").unwrap();
    let long = "n".repeat(NAME_MAX + 1);
    assert!(matches!(
        fs.create(ROOT_ID, &long, 0o644),
        Err(FsError::NameTooLong(_))
    ));
    assert!(matches!(
        fs.symlink(ROOT_ID, &long, "/x"),
        Err(FsError::NameTooLong(_))
    ));
    assert!(matches!(
        fs.lookup(ROOT_ID, &long),
        Err(FsError::NameTooLong(_))
    ));
}

#[test]
fn test_symlink_duplicate_and_verbatim_target() {
    let fs = mount("").unwrap();
    let l = fs.symlink(ROOT_ID, "l", "../../does/not/exist").unwrap();
    assert_eq!(fs.readlink(l.id()).unwrap(), "../../does/not/exist");
    assert_eq!(fs.getattr(l.id()).unwrap().size, 20);
    assert!(matches!(
        fs.symlink(ROOT_ID, "l", "x"),
        Err(FsError::AlreadyExists(_))
    ));
}

#[test]
fn test_statfs() {
    let fs = mount("wsize=8192").unwrap();
    let st = fs.statfs();
    assert_eq!(st.bsize, 8192);
    assert_eq!(st.bfree, u64::MAX);
    assert_eq!(st.namelen, NAME_MAX as u32);
}

#[test]
fn test_ids_never_reused() {
    let fs = mount("").unwrap();
    let first = fs.create(ROOT_ID, "a", 0o644).unwrap().id();
    fs.unlink(ROOT_ID, "a").unwrap();
    let second = fs.create(ROOT_ID, "a", 0o644).unwrap().id();
    assert!(second > first);
}

#[test]
fn test_unmount_reports_outstanding_handles() {
    let fs = mount("").unwrap();
    let d = fs.mkdir(ROOT_ID, "d", 0o755).unwrap();
    fs.create(d.id(), "f", 0o644).unwrap();

    let stats = fs.unmount();
    assert_eq!(stats.released, 3);
    assert_eq!(stats.outstanding_handles, 1);
    // The stale handle can still be dropped safely.
    drop(d);
}

#[test]
fn test_concurrent_creates_have_one_winner() {
    let fs = mount("").unwrap();
    let winners = AtomicUsize::new(0);
    let losers = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| match fs.create(ROOT_ID, "contended", 0o644) {
                Ok(_) => {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
                Err(FsError::AlreadyExists(_)) => {
                    losers.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => panic!("unexpected error: {e}"),
            });
        }
    });

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(losers.load(Ordering::SeqCst), 7);
    assert_eq!(entry_count(&fs, ROOT_ID), 1);
}

#[test]
fn test_concurrent_churn_keeps_counts_consistent() {
    let fs = Arc::new(mount("").unwrap());
    let dir = fs.mkdir(ROOT_ID, "churn", 0o755).unwrap().id();

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let fs = Arc::clone(&fs);
            thread::spawn(move || {
                for i in 0..200 {
                    let name = format!("t{t}-{}", i % 10);
                    if let Ok(h) = fs.create(dir, &name, 0o644) {
                        fs.write(h.id(), 0, name.as_bytes()).unwrap();
                    }
                    if i % 3 == 0 {
                        let sub = format!("d{t}");
                        let _ = fs.mkdir(dir, &sub, 0o755);
                        let _ = fs.rmdir(dir, &sub);
                    }
                    let _ = fs.unlink(dir, &name);
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    assert_eq!(entry_count(&fs, dir), 0);
    assert_eq!(fs.getattr(dir).unwrap().nlink, 2);
    // Root plus the churn directory.
    assert_eq!(fs.node_count(), 2);
}

#[test]
fn test_registry_mount_by_name() {
    let registry = FsTypeRegistry::new();
    registry.register(FS_TYPE).unwrap();
    let fs = registry.mount("myfs", "rsize=512").unwrap();
    assert_eq!(fs.statfs().rsize, 512);
    assert!(matches!(
        registry.mount("ext4", ""),
        Err(FsError::NotFound(_))
    ));
}

#[test]
fn test_rename_over_non_empty_directory() {
    let fs = mount("").unwrap();
    let a = fs.mkdir(ROOT_ID, "a", 0o755).unwrap();
    let b = fs.mkdir(ROOT_ID, "b", 0o755).unwrap();
    fs.create(b.id(), "keep", 0o644).unwrap();
    let root_links = fs.getattr(ROOT_ID).unwrap().nlink;

    assert!(matches!(
        fs.rename(ROOT_ID, "a", ROOT_ID, "b"),
        Err(FsError::DirectoryNotEmpty(_))
    ));
    assert_eq!(fs.lookup(ROOT_ID, "a").unwrap().id(), a.id());
    assert_eq!(fs.lookup(ROOT_ID, "b").unwrap().id(), b.id());
    assert!(fs.lookup(b.id(), "keep").is_ok());
    assert_eq!(fs.getattr(ROOT_ID).unwrap().nlink, root_links);
}

#[test]
fn test_far_write_after_truncate() {
    let fs = mount("").unwrap();
    let far = 1u64 << 62;

    let grown = fs.create(ROOT_ID, "grown", 0o644).unwrap();
    fs.truncate(grown.id(), far).unwrap();
    assert_eq!(fs.write(grown.id(), far - 1, b"x").unwrap(), 1);
    assert_eq!(fs.getattr(grown.id()).unwrap().size, far);
    assert_eq!(fs.read(grown.id(), far - 1, 4).unwrap(), b"x");

    let sparse = fs.create(ROOT_ID, "sparse", 0o644).unwrap();
    fs.write(sparse.id(), far, b"x").unwrap();
    assert_eq!(fs.getattr(sparse.id()).unwrap().size, far + 1);
    assert_eq!(fs.read(sparse.id(), 0, 3).unwrap(), vec![0u8; 3]);
}

#[test]
fn test_namespace_changes_touch_parent_times() {
    let fs = mount("").unwrap();
    let src = fs.mkdir(ROOT_ID, "src", 0o755).unwrap();
    let dst = fs.mkdir(ROOT_ID, "dst", 0o755).unwrap();

    let before = fs.getattr(src.id()).unwrap();
    tick();
    fs.create(src.id(), "f", 0o644).unwrap();
    let after_create = fs.getattr(src.id()).unwrap();
    assert!(after_create.mtime > before.mtime);
    assert!(after_create.ctime > before.ctime);

    let dst_before = fs.getattr(dst.id()).unwrap();
    tick();
    fs.rename(src.id(), "f", dst.id(), "g").unwrap();
    let after_rename = fs.getattr(src.id()).unwrap();
    let dst_after = fs.getattr(dst.id()).unwrap();
    assert!(after_rename.mtime > after_create.mtime);
    assert!(after_rename.ctime > after_create.ctime);
    assert!(dst_after.mtime > dst_before.mtime);
    assert!(dst_after.ctime > dst_before.ctime);

    tick();
    fs.unlink(dst.id(), "g").unwrap();
    let after_unlink = fs.getattr(dst.id()).unwrap();
    assert!(after_unlink.mtime > dst_after.mtime);
    assert!(after_unlink.ctime > dst_after.ctime);
}

#[test]
fn test_write_touches_file_and_reads_do_not() {
    let fs = mount("").unwrap();
    let f = fs.create(ROOT_ID, "f", 0o644).unwrap();

    let created = fs.getattr(f.id()).unwrap();
    tick();
    fs.write(f.id(), 0, b"data").unwrap();
    let written = fs.getattr(f.id()).unwrap();
    assert!(written.mtime > created.mtime);
    assert!(written.ctime > created.ctime);

    let root_before = fs.getattr(ROOT_ID).unwrap();
    tick();
    fs.lookup(ROOT_ID, "f").unwrap();
    fs.read(f.id(), 0, 4).unwrap();
    assert_eq!(times(&fs.getattr(f.id()).unwrap()), times(&written));
    assert_eq!(times(&fs.getattr(ROOT_ID).unwrap()), times(&root_before));
}
