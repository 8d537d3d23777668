// CLASSIFICATION: COMMUNITY
// Filename: lake_concurrency.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

use datapond_lake::storage::ScannedNode;
use datapond_lake::{DiskStorage, Lake, LakeConfig, LakeError, LakePath, NodeKind, Storage};
use std::io;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

fn config(dir: &tempfile::TempDir) -> LakeConfig {
    LakeConfig {
        root: dir.path().join("filesystems"),
        ..LakeConfig::default()
    }
}

fn open(dir: &tempfile::TempDir) -> Arc<Lake> {
    Arc::new(Lake::open(&config(dir)).expect("open lake"))
}

/// Disk storage that stalls while creating directories more than two levels
/// deep.
struct SlowDeepDirs(DiskStorage);

impl Storage for SlowDeepDirs {
    fn create_filesystem(&self, filesystem: &str) -> io::Result<()> {
        self.0.create_filesystem(filesystem)
    }
    fn remove_filesystem(&self, filesystem: &str) -> io::Result<()> {
        self.0.remove_filesystem(filesystem)
    }
    fn create_dir(&self, filesystem: &str, path: &LakePath) -> io::Result<()> {
        if path.segments().len() > 2 {
            thread::sleep(Duration::from_millis(200));
        }
        self.0.create_dir(filesystem, path)
    }
    fn create_file(&self, filesystem: &str, path: &LakePath) -> io::Result<()> {
        self.0.create_file(filesystem, path)
    }
    fn persist(&self, filesystem: &str, path: &LakePath, offset: u64, bytes: &[u8]) -> io::Result<()> {
        self.0.persist(filesystem, path, offset, bytes)
    }
    fn truncate(&self, filesystem: &str, path: &LakePath, len: u64) -> io::Result<()> {
        self.0.truncate(filesystem, path, len)
    }
    fn read(&self, filesystem: &str, path: &LakePath, offset: u64, len: u64) -> io::Result<Vec<u8>> {
        self.0.read(filesystem, path, offset, len)
    }
    fn remove(&self, filesystem: &str, path: &LakePath) -> io::Result<()> {
        self.0.remove(filesystem, path)
    }
    fn filesystems(&self) -> io::Result<Vec<String>> {
        self.0.filesystems()
    }
    fn scan(&self, filesystem: &str) -> io::Result<Vec<ScannedNode>> {
        self.0.scan(filesystem)
    }
    fn load_manifest(&self) -> io::Result<Option<Vec<u8>>> {
        self.0.load_manifest()
    }
    fn store_manifest(&self, bytes: &[u8]) -> io::Result<()> {
        self.0.store_manifest(bytes)
    }
}

fn slow_lake(cfg: &LakeConfig) -> Arc<Lake> {
    let storage = DiskStorage::open(&cfg.root).expect("storage");
    Arc::new(Lake::with_storage(cfg, Arc::new(SlowDeepDirs(storage))).expect("lake"))
}

#[test]
fn unrelated_paths_progress_in_parallel() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lake = open(&dir);
    lake.create_filesystem("fs1").expect("fs");
    let mut handles = Vec::new();
    for i in 0..4 {
        let lake = lake.clone();
        handles.push(thread::spawn(move || {
            for j in 0..25 {
                let path = format!("/worker{}/file{}", i, j);
                lake.create_path("fs1", &path, NodeKind::File, true)
                    .expect("create");
                lake.append("fs1", &path, 0, b"x").expect("append");
                lake.flush("fs1", &path, 1).expect("flush");
                assert_eq!(lake.read("fs1", &path, 0, 1).expect("read"), b"x");
            }
        }));
    }
    for h in handles {
        h.join().expect("thread failed");
    }
    let listing = lake.list_paths("fs1", "", true).expect("list");
    assert_eq!(listing.len(), 4 + 4 * 25);
}

#[test]
fn contended_appends_commit_without_interleaving() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lake = open(&dir);
    lake.create_filesystem("fs1").expect("fs");
    lake.create_path("fs1", "log.bin", NodeKind::File, true)
        .expect("create");

    // callers chain offsets through a shared cursor; each chunk is tagged
    // with its writer so corruption would be visible
    let cursor = Arc::new(Mutex::new(0u64));
    let barrier = Arc::new(Barrier::new(8));
    let mut handles = Vec::new();
    for writer in 0..8u8 {
        let lake = lake.clone();
        let cursor = cursor.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..20 {
                let chunk = vec![writer; 16];
                let mut at = cursor.lock().expect("cursor");
                lake.append("fs1", "log.bin", *at, &chunk).expect("append");
                *at += chunk.len() as u64;
                lake.flush("fs1", "log.bin", *at).expect("flush");
            }
        }));
    }
    for h in handles {
        h.join().expect("thread failed");
    }

    let data = lake.read_all("fs1", "log.bin").expect("read");
    assert_eq!(data.len(), 8 * 20 * 16);
    for chunk in data.chunks(16) {
        assert!(chunk.iter().all(|b| *b == chunk[0]), "torn chunk {:?}", chunk);
    }
}

#[test]
fn racing_appends_at_the_same_offset_admit_exactly_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lake = open(&dir);
    lake.create_filesystem("fs1").expect("fs");
    lake.create_path("fs1", "f", NodeKind::File, true)
        .expect("create");

    let barrier = Arc::new(Barrier::new(6));
    let handles: Vec<_> = (0..6u8)
        .map(|writer| {
            let lake = lake.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                lake.append("fs1", "f", 0, &[writer; 4])
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread failed"))
        .collect();
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, LakeError::InvalidOffset { .. })));
    lake.flush("fs1", "f", 4).expect("flush");
    assert_eq!(lake.read_all("fs1", "f").expect("read").len(), 4);
}

#[test]
fn readers_see_whole_flushes_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lake = open(&dir);
    lake.create_filesystem("fs1").expect("fs");
    lake.create_path("fs1", "f", NodeKind::File, true)
        .expect("create");

    let writer = {
        let lake = lake.clone();
        thread::spawn(move || {
            let mut at = 0u64;
            for _ in 0..50 {
                lake.append("fs1", "f", at, &[0xAB; 64]).expect("append");
                at += 64;
                lake.flush("fs1", "f", at).expect("flush");
            }
        })
    };
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let lake = lake.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    let data = lake.read_all("fs1", "f").expect("read");
                    assert_eq!(data.len() % 64, 0);
                    assert!(data.iter().all(|b| *b == 0xAB));
                }
            })
        })
        .collect();
    writer.join().expect("writer failed");
    for r in readers {
        r.join().expect("reader failed");
    }
}

#[test]
fn whole_file_reads_survive_concurrent_overwrites() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lake = open(&dir);
    lake.create_filesystem("fs1").expect("fs");
    lake.create_path("fs1", "f", NodeKind::File, true)
        .expect("create");

    let writer = {
        let lake = lake.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                lake.create_path("fs1", "f", NodeKind::File, false)
                    .expect("overwrite");
                lake.append("fs1", "f", 0, &[0xCD; 64]).expect("append");
                lake.flush("fs1", "f", 64).expect("flush");
            }
        })
    };
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let lake = lake.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let data = lake.read_all("fs1", "f").expect("read");
                    assert!(data.is_empty() || data == [0xCD; 64]);
                }
            })
        })
        .collect();
    writer.join().expect("writer failed");
    for r in readers {
        r.join().expect("reader failed");
    }
}

#[test]
fn recursive_delete_waits_for_deeper_create_in_flight() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = config(&dir);
    let lake = slow_lake(&cfg);
    lake.create_filesystem("fs1").expect("fs");
    lake.create_path("fs1", "a/b", NodeKind::Directory, false)
        .expect("dirs");

    let creator = {
        let lake = lake.clone();
        thread::spawn(move || lake.create_path("fs1", "a/b/c/d", NodeKind::Directory, false))
    };
    thread::sleep(Duration::from_millis(50));
    lake.delete_path("fs1", "a", true).expect("delete");
    creator.join().expect("creator failed").expect("create");

    // the create finished before the delete took the tree
    assert!(matches!(
        lake.path_properties("fs1", "a").unwrap_err(),
        LakeError::PathNotFound { .. }
    ));
    assert!(!cfg.root.join("fs1").join("a").exists());
    drop(lake);

    let reopened = Lake::open(&cfg).expect("reopen");
    assert!(reopened.list("fs1", "").expect("list").is_empty());
}

#[test]
fn filesystem_delete_waits_for_deeper_create_in_flight() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = config(&dir);
    let lake = slow_lake(&cfg);
    lake.create_filesystem("fs1").expect("fs");
    lake.create_path("fs1", "a/b", NodeKind::Directory, false)
        .expect("dirs");

    let creator = {
        let lake = lake.clone();
        thread::spawn(move || lake.create_path("fs1", "a/b/c/d", NodeKind::Directory, false))
    };
    thread::sleep(Duration::from_millis(50));
    lake.delete_filesystem("fs1").expect("delete");
    creator.join().expect("creator failed").expect("create");

    assert!(lake.filesystem_properties("fs1").is_err());
    assert!(!cfg.root.join("fs1").exists());
    drop(lake);

    let reopened = Lake::open(&cfg).expect("reopen");
    assert!(reopened.list_filesystems().is_empty());
}
