// CLASSIFICATION: COMMUNITY
// Filename: storage.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Physical persistence of committed bytes.
//!
//! The on-disk layout mirrors the namespace: `<root>/<filesystem>/<a>/<b>`.
//! Filesystem names cannot contain `.` and path segments cannot be `.` or
//! `..`, so dot-prefixed entries under the root (`.trash`, the manifest
//! temp file) never collide with user data.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::path::{validate_filesystem_name, LakePath, NodeKind};

/// Registry manifest file name under the storage root.
pub const MANIFEST_FILE: &str = "properties.json";
const TRASH_DIR: &str = ".trash";

/// Node discovered while scanning a filesystem directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedNode {
    pub path: LakePath,
    pub kind: NodeKind,
    pub len: u64,
}

/// Backend the engine persists committed content through.
///
/// Mutating calls must either take full effect or leave the previous
/// physical state readable.
pub trait Storage: Send + Sync {
    /// Create the top-level directory of a filesystem.
    fn create_filesystem(&self, filesystem: &str) -> io::Result<()>;
    /// Remove a filesystem and everything it contains.
    fn remove_filesystem(&self, filesystem: &str) -> io::Result<()>;
    /// Create `path` and any missing parents as directories.
    fn create_dir(&self, filesystem: &str, path: &LakePath) -> io::Result<()>;
    /// Create an empty file, truncating an existing one.
    fn create_file(&self, filesystem: &str, path: &LakePath) -> io::Result<()>;
    /// Write `bytes` at `offset` durably.
    fn persist(&self, filesystem: &str, path: &LakePath, offset: u64, bytes: &[u8]) -> io::Result<()>;
    /// Cut an existing file down to `len` bytes.
    fn truncate(&self, filesystem: &str, path: &LakePath, len: u64) -> io::Result<()>;
    /// Read exactly `len` bytes from `offset`.
    fn read(&self, filesystem: &str, path: &LakePath, offset: u64, len: u64) -> io::Result<Vec<u8>>;
    /// Remove a file or a directory subtree with all persisted bytes.
    fn remove(&self, filesystem: &str, path: &LakePath) -> io::Result<()>;
    /// Names of filesystem directories present in storage.
    fn filesystems(&self) -> io::Result<Vec<String>>;
    /// Every node under a filesystem, parents before children.
    fn scan(&self, filesystem: &str) -> io::Result<Vec<ScannedNode>>;
    /// Registry manifest bytes, if one was stored.
    fn load_manifest(&self) -> io::Result<Option<Vec<u8>>>;
    /// Replace the registry manifest.
    fn store_manifest(&self, bytes: &[u8]) -> io::Result<()>;
}

/// Storage rooted in a local directory.
pub struct DiskStorage {
    root: PathBuf,
    trash: PathBuf,
    trash_seq: AtomicU64,
}

impl DiskStorage {
    /// Open (creating if needed) the storage root and purge leftover trash.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        if root.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("storage root {} exists as a file", root.display()),
            ));
        }
        fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;
        let trash = root.join(TRASH_DIR);
        if trash.exists() {
            if let Err(err) = fs::remove_dir_all(&trash) {
                warn!("could not purge {}: {}", trash.display(), err);
            }
        }
        fs::create_dir_all(&trash)?;
        Ok(Self {
            root,
            trash,
            trash_seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn physical(&self, filesystem: &str, path: &LakePath) -> PathBuf {
        let mut out = self.root.join(filesystem);
        for seg in path.segments() {
            out.push(seg);
        }
        out
    }

    /// Move `target` out of sight atomically, then purge it.
    fn discard(&self, target: &Path) -> io::Result<()> {
        let seq = self.trash_seq.fetch_add(1, Ordering::Relaxed);
        let parked = self.trash.join(format!("{}-{}", std::process::id(), seq));
        fs::rename(target, &parked)?;
        let purged = if parked.is_dir() {
            fs::remove_dir_all(&parked)
        } else {
            fs::remove_file(&parked)
        };
        if let Err(err) = purged {
            warn!("deferred purge of {}: {}", parked.display(), err);
        }
        Ok(())
    }
}

impl Storage for DiskStorage {
    fn create_filesystem(&self, filesystem: &str) -> io::Result<()> {
        fs::create_dir_all(self.root.join(filesystem))
    }

    fn remove_filesystem(&self, filesystem: &str) -> io::Result<()> {
        self.discard(&self.root.join(filesystem))
    }

    fn create_dir(&self, filesystem: &str, path: &LakePath) -> io::Result<()> {
        fs::create_dir_all(self.physical(filesystem, path))
    }

    fn create_file(&self, filesystem: &str, path: &LakePath) -> io::Result<()> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.physical(filesystem, path))
            .map(|_| ())
    }

    fn persist(&self, filesystem: &str, path: &LakePath, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let target = self.physical(filesystem, path);
        let mut file = OpenOptions::new().write(true).open(&target)?;
        file.seek(SeekFrom::Start(offset))?;
        if let Err(err) = file.write_all(bytes).and_then(|_| file.sync_data()) {
            // drop the torn tail so a restart never adopts it
            if let Err(trim) = file.set_len(offset) {
                warn!("could not trim {} to {}: {}", target.display(), offset, trim);
            }
            return Err(err);
        }
        debug!("persisted {} bytes at {} in {}", bytes.len(), offset, target.display());
        Ok(())
    }

    fn truncate(&self, filesystem: &str, path: &LakePath, len: u64) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(self.physical(filesystem, path))?;
        file.set_len(len)?;
        file.sync_data()
    }

    fn read(&self, filesystem: &str, path: &LakePath, offset: u64, len: u64) -> io::Result<Vec<u8>> {
        let mut file = fs::File::open(self.physical(filesystem, path))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn remove(&self, filesystem: &str, path: &LakePath) -> io::Result<()> {
        self.discard(&self.physical(filesystem, path))
    }

    fn filesystems(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if validate_filesystem_name(&name).is_ok() => names.push(name),
                Ok(_) | Err(_) => debug!("ignoring {}", entry.path().display()),
            }
        }
        names.sort();
        Ok(names)
    }

    fn scan(&self, filesystem: &str) -> io::Result<Vec<ScannedNode>> {
        let base = self.root.join(filesystem);
        let mut out = Vec::new();
        let walker = WalkDir::new(&base)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name().to_str().map(|n| !n.starts_with('.')).unwrap_or(false));
        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            let rel = match entry.path().strip_prefix(&base) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let segments = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned());
            let path = match LakePath::from_segments(segments) {
                Ok(path) => path,
                Err(err) => {
                    warn!("skipping {}: {}", entry.path().display(), err);
                    continue;
                }
            };
            let file_type = entry.file_type();
            if file_type.is_dir() {
                out.push(ScannedNode {
                    path,
                    kind: NodeKind::Directory,
                    len: 0,
                });
            } else if file_type.is_file() {
                out.push(ScannedNode {
                    path,
                    kind: NodeKind::File,
                    len: entry.metadata().map_err(io::Error::from)?.len(),
                });
            }
        }
        Ok(out)
    }

    fn load_manifest(&self) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.root.join(MANIFEST_FILE)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn store_manifest(&self, bytes: &[u8]) -> io::Result<()> {
        let tmp = self.root.join(format!(".{}.tmp", MANIFEST_FILE));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.root.join(MANIFEST_FILE))
    }
}

#[derive(Debug, Clone)]
enum MemEntry {
    Dir,
    File(Vec<u8>),
}

/// Volatile storage keyed by `<filesystem>/<path>`, used by tests and
/// throwaway instances. Writes can be made to fail on demand.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, MemEntry>>,
    manifest: Mutex<Option<Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    /// Make every subsequent mutating call fail with an I/O error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn key(filesystem: &str, path: &LakePath) -> String {
        if path.is_root() {
            filesystem.to_string()
        } else {
            format!("{}/{}", filesystem, path)
        }
    }

    fn check(&self) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(io::Error::new(io::ErrorKind::Other, "injected storage failure"))
        } else {
            Ok(())
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, MemEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn not_found(key: &str) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, key.to_string())
    }

    fn remove_key(&self, key: &str) -> io::Result<()> {
        let mut entries = self.entries();
        if entries.remove(key).is_none() {
            return Err(Self::not_found(key));
        }
        let nested = format!("{}/", key);
        entries.retain(|k, _| !k.starts_with(&nested));
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn create_filesystem(&self, filesystem: &str) -> io::Result<()> {
        self.check()?;
        self.entries().insert(filesystem.to_string(), MemEntry::Dir);
        Ok(())
    }

    fn remove_filesystem(&self, filesystem: &str) -> io::Result<()> {
        self.check()?;
        self.remove_key(filesystem)
    }

    fn create_dir(&self, filesystem: &str, path: &LakePath) -> io::Result<()> {
        self.check()?;
        let mut entries = self.entries();
        for n in 0..=path.segments().len() {
            entries
                .entry(Self::key(filesystem, &path.prefix(n)))
                .or_insert(MemEntry::Dir);
        }
        Ok(())
    }

    fn create_file(&self, filesystem: &str, path: &LakePath) -> io::Result<()> {
        self.check()?;
        self.entries()
            .insert(Self::key(filesystem, path), MemEntry::File(Vec::new()));
        Ok(())
    }

    fn persist(&self, filesystem: &str, path: &LakePath, offset: u64, bytes: &[u8]) -> io::Result<()> {
        self.check()?;
        let key = Self::key(filesystem, path);
        let mut entries = self.entries();
        match entries.get_mut(&key) {
            Some(MemEntry::File(data)) => {
                let start = offset as usize;
                if data.len() < start + bytes.len() {
                    data.resize(start + bytes.len(), 0);
                }
                data[start..start + bytes.len()].copy_from_slice(bytes);
                Ok(())
            }
            _ => Err(Self::not_found(&key)),
        }
    }

    fn truncate(&self, filesystem: &str, path: &LakePath, len: u64) -> io::Result<()> {
        self.check()?;
        let key = Self::key(filesystem, path);
        match self.entries().get_mut(&key) {
            Some(MemEntry::File(data)) => {
                data.truncate(len as usize);
                Ok(())
            }
            _ => Err(Self::not_found(&key)),
        }
    }

    fn read(&self, filesystem: &str, path: &LakePath, offset: u64, len: u64) -> io::Result<Vec<u8>> {
        let key = Self::key(filesystem, path);
        match self.entries().get(&key) {
            Some(MemEntry::File(data)) => data
                .get(offset as usize..(offset + len) as usize)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, key.clone())),
            _ => Err(Self::not_found(&key)),
        }
    }

    fn remove(&self, filesystem: &str, path: &LakePath) -> io::Result<()> {
        self.check()?;
        self.remove_key(&Self::key(filesystem, path))
    }

    fn filesystems(&self) -> io::Result<Vec<String>> {
        Ok(self
            .entries()
            .keys()
            .filter(|k| !k.contains('/'))
            .cloned()
            .collect())
    }

    fn scan(&self, filesystem: &str) -> io::Result<Vec<ScannedNode>> {
        let prefix = format!("{}/", filesystem);
        let mut out = Vec::new();
        for (key, entry) in self.entries().iter() {
            let rel = match key.strip_prefix(&prefix) {
                Some(rel) => rel,
                None => continue,
            };
            let path = LakePath::parse(rel).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            out.push(match entry {
                MemEntry::Dir => ScannedNode {
                    path,
                    kind: NodeKind::Directory,
                    len: 0,
                },
                MemEntry::File(data) => ScannedNode {
                    path,
                    kind: NodeKind::File,
                    len: data.len() as u64,
                },
            });
        }
        Ok(out)
    }

    fn load_manifest(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.manifest.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn store_manifest(&self, bytes: &[u8]) -> io::Result<()> {
        self.check()?;
        *self.manifest.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(raw: &str) -> LakePath {
        LakePath::parse(raw).expect("valid path")
    }

    #[test]
    fn disk_layout_mirrors_namespace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskStorage::open(dir.path().join("filesystems")).expect("open");
        storage.create_filesystem("fs1").expect("fs");
        storage.create_dir("fs1", &p("a/b")).expect("dir");
        storage.create_file("fs1", &p("a/b/c.txt")).expect("file");
        storage.persist("fs1", &p("a/b/c.txt"), 0, b"hello").expect("persist");
        storage.persist("fs1", &p("a/b/c.txt"), 5, b"!").expect("persist");

        let on_disk = storage.root().join("fs1").join("a").join("b").join("c.txt");
        assert_eq!(fs::read(on_disk).expect("read"), b"hello!");
        assert_eq!(storage.read("fs1", &p("a/b/c.txt"), 1, 4).expect("read"), b"ello");
    }

    #[test]
    fn same_names_do_not_collide_across_filesystems() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskStorage::open(dir.path()).expect("open");
        for fs_name in ["one", "two"] {
            storage.create_filesystem(fs_name).expect("fs");
            storage.create_dir(fs_name, &p("d")).expect("dir");
            storage.create_file(fs_name, &p("d/f")).expect("file");
            storage.persist(fs_name, &p("d/f"), 0, fs_name.as_bytes()).expect("persist");
        }
        assert_eq!(storage.read("one", &p("d/f"), 0, 3).expect("read"), b"one");
        assert_eq!(storage.read("two", &p("d/f"), 0, 3).expect("read"), b"two");
    }

    #[test]
    fn remove_moves_subtree_out_of_the_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskStorage::open(dir.path()).expect("open");
        storage.create_filesystem("fs1").expect("fs");
        storage.create_dir("fs1", &p("a/b")).expect("dir");
        storage.create_file("fs1", &p("a/b/f")).expect("file");
        storage.remove("fs1", &p("a")).expect("remove");
        assert!(!storage.root().join("fs1").join("a").exists());
        assert!(storage.remove("fs1", &p("a")).is_err());
        assert_eq!(storage.filesystems().expect("list"), vec!["fs1".to_string()]);
    }

    #[test]
    fn scan_lists_parents_before_children() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskStorage::open(dir.path()).expect("open");
        storage.create_filesystem("fs1").expect("fs");
        storage.create_dir("fs1", &p("a")).expect("dir");
        storage.create_file("fs1", &p("a/f")).expect("file");
        storage.persist("fs1", &p("a/f"), 0, b"abc").expect("persist");
        let scanned = storage.scan("fs1").expect("scan");
        assert_eq!(
            scanned,
            vec![
                ScannedNode {
                    path: p("a"),
                    kind: NodeKind::Directory,
                    len: 0
                },
                ScannedNode {
                    path: p("a/f"),
                    kind: NodeKind::File,
                    len: 3
                },
            ]
        );
    }

    #[test]
    fn truncate_cuts_files_back_without_creating_them() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskStorage::open(dir.path()).expect("open");
        storage.create_filesystem("fs1").expect("fs");
        storage.create_file("fs1", &p("f")).expect("file");
        storage.persist("fs1", &p("f"), 0, b"abcdef").expect("persist");
        storage.truncate("fs1", &p("f"), 2).expect("truncate");
        assert_eq!(fs::read(storage.root().join("fs1").join("f")).expect("read"), b"ab");
        assert!(storage.truncate("fs1", &p("gone"), 0).is_err());
        assert!(!storage.root().join("fs1").join("gone").exists());

        let memory = MemoryStorage::default();
        memory.create_filesystem("fs1").expect("fs");
        memory.create_file("fs1", &p("f")).expect("file");
        memory.persist("fs1", &p("f"), 0, b"abcdef").expect("persist");
        memory.truncate("fs1", &p("f"), 3).expect("truncate");
        assert_eq!(memory.scan("fs1").expect("scan")[0].len, 3);
    }

    #[test]
    fn manifest_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskStorage::open(dir.path()).expect("open");
        assert!(storage.load_manifest().expect("load").is_none());
        storage.store_manifest(b"{}").expect("store");
        assert_eq!(storage.load_manifest().expect("load").as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn root_that_is_a_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("taken");
        fs::write(&file, b"x").expect("write");
        assert!(DiskStorage::open(&file).is_err());
    }

    #[test]
    fn memory_storage_can_fail_on_demand() {
        let storage = MemoryStorage::default();
        storage.create_filesystem("fs1").expect("fs");
        storage.fail_writes(true);
        assert!(storage.create_dir("fs1", &p("a")).is_err());
        storage.fail_writes(false);
        storage.create_dir("fs1", &p("a")).expect("dir");
        assert_eq!(storage.scan("fs1").expect("scan").len(), 1);
    }
}
