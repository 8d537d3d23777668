// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Core engine of the datapond Data Lake emulator.
//
// ─────────────────────────────────────────────────────────────────────────────
// datapond‑lake – hierarchical namespace + append/flush write protocol
//
// Filesystems hold trees of directories and files. Files accept bytes in two
// steps: `append` buffers bytes at the current end of the stream, `flush`
// commits a prefix of the buffered bytes to disk. Readers only ever see
// committed bytes.
//
// # Design Notes
// * Every mutating call consults the shared [`FailureInjector`] first and
//   applies nothing when it fires.
// * Locks are per directory and per file; unrelated paths never contend.
// * The HTTP surface lives in the `datapond` crate; nothing here knows
//   about requests or status codes.
//
// # Public Surface
// * [`LakeConfig`] – storage root, failure chance, optional RNG seed.
// * [`Lake`] – the operations consumed by the HTTP adapter.
// ─────────────────────────────────────────────────────────────────────────────

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};

pub mod error;
pub mod failure;
pub mod path;
pub mod registry;
pub mod storage;
pub mod write;

pub use error::{LakeError, LakeResult, WriteOp};
pub use failure::FailureInjector;
pub use path::{DirEntry, LakePath, NodeKind, PathStatus};
pub use registry::{Filesystem, FilesystemListing, FilesystemProperties};
pub use storage::{DiskStorage, MemoryStorage, Storage};
pub use write::WritePhase;

use path::Node;
use registry::Registry;

/// Runtime configuration of the engine.
#[derive(Debug, Clone)]
pub struct LakeConfig {
    /// Directory that holds one subdirectory per filesystem.
    pub root: PathBuf,
    /// Probability in `[0, 1]` that a mutating call fails on purpose.
    pub failure_chance: f64,
    /// Fixed seed for the failure gate; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./filesystems"),
            failure_chance: 0.0,
            seed: None,
        }
    }
}

/// The emulated Data Lake.
pub struct Lake {
    registry: Registry,
    storage: Arc<dyn Storage>,
    gate: FailureInjector,
}

impl Lake {
    /// Open the lake on disk, recovering filesystems already present under
    /// the storage root.
    pub fn open(cfg: &LakeConfig) -> LakeResult<Self> {
        if cfg.root.is_file() {
            return Err(LakeError::InvalidConfig(format!(
                "storage root {} already exists as a file",
                cfg.root.display()
            )));
        }
        let storage = DiskStorage::open(&cfg.root)?;
        info!("storage root {}", storage.root().display());
        Self::with_storage(cfg, Arc::new(storage))
    }

    /// Build a lake over any [`Storage`] backend.
    pub fn with_storage(cfg: &LakeConfig, storage: Arc<dyn Storage>) -> LakeResult<Self> {
        let gate = match cfg.seed {
            Some(seed) => FailureInjector::seeded(cfg.failure_chance, seed)?,
            None => FailureInjector::new(cfg.failure_chance)?,
        };
        let registry = Registry::new();
        let recovered = registry.recover(storage.as_ref())?;
        info!(
            "lake ready: {} filesystem(s), failure chance {:.2}%",
            recovered,
            gate.chance() * 100.0
        );
        Ok(Self {
            registry,
            storage,
            gate,
        })
    }

    /// Failure gate shared by all operations.
    pub fn failure_injector(&self) -> &FailureInjector {
        &self.gate
    }

    // ── filesystems ────────────────────────────────────────────────────────

    pub fn create_filesystem(&self, name: &str) -> LakeResult<FilesystemProperties> {
        path::validate_filesystem_name(name)?;
        self.gate.gate("create filesystem")?;
        Ok(self.registry.create(name, self.storage.as_ref())?.properties())
    }

    pub fn delete_filesystem(&self, name: &str) -> LakeResult<()> {
        self.gate.gate("delete filesystem")?;
        self.registry.delete(name, self.storage.as_ref())
    }

    /// Filesystems in creation order.
    pub fn list_filesystems(&self) -> FilesystemListing {
        self.registry.list()
    }

    pub fn filesystem_properties(&self, name: &str) -> LakeResult<FilesystemProperties> {
        Ok(self.registry.get(name)?.properties())
    }

    pub fn set_filesystem_properties(
        &self,
        name: &str,
        metadata: BTreeMap<String, String>,
    ) -> LakeResult<FilesystemProperties> {
        self.gate.gate("set filesystem properties")?;
        self.registry.set_metadata(name, metadata, self.storage.as_ref())
    }

    // ── paths ──────────────────────────────────────────────────────────────

    /// Create a directory or file, auto-creating parent directories.
    pub fn create_path(
        &self,
        filesystem: &str,
        path: &str,
        kind: NodeKind,
        fail_if_exists: bool,
    ) -> LakeResult<PathStatus> {
        let (fs, path) = self.locate(filesystem, path)?;
        self.gate.gate("create path")?;
        let node = fs
            .namespace()
            .create_path(&path, kind, fail_if_exists, self.storage.as_ref())?;
        fs.touch();
        Ok(PathStatus::of(&node, &path))
    }

    pub fn delete_path(&self, filesystem: &str, path: &str, recursive: bool) -> LakeResult<()> {
        let (fs, path) = self.locate(filesystem, path)?;
        self.gate.gate("delete path")?;
        fs.namespace().delete(&path, recursive, self.storage.as_ref())?;
        fs.touch();
        Ok(())
    }

    /// Immediate children of a directory.
    pub fn list(&self, filesystem: &str, path: &str) -> LakeResult<Vec<DirEntry>> {
        let (fs, path) = self.locate(filesystem, path)?;
        fs.namespace().list(&path)
    }

    /// Children (or all descendants) of a directory with their properties.
    pub fn list_paths(&self, filesystem: &str, path: &str, recursive: bool) -> LakeResult<Vec<PathStatus>> {
        let (fs, path) = self.locate(filesystem, path)?;
        fs.namespace().list_paths(&path, recursive)
    }

    pub fn path_properties(&self, filesystem: &str, path: &str) -> LakeResult<PathStatus> {
        let (fs, path) = self.locate(filesystem, path)?;
        fs.namespace().status(&path)
    }

    // ── file content ───────────────────────────────────────────────────────

    /// Buffer `bytes` at `offset`; nothing becomes readable until a flush.
    pub fn append(&self, filesystem: &str, path: &str, offset: u64, bytes: &[u8]) -> LakeResult<()> {
        let (fs, path) = self.locate(filesystem, path)?;
        self.gate.gate("append")?;
        let node = self.file(&fs, &path)?;
        let mut state = node.file_write().ok_or_else(|| not_a_file(&path))?;
        if state.is_detached() {
            return Err(LakeError::not_found(path.to_string()));
        }
        state.append(offset, bytes)?;
        debug!("append {}/{} @{} +{}", filesystem, path, offset, bytes.len());
        Ok(())
    }

    /// Commit buffered bytes up to `offset`.
    pub fn flush(&self, filesystem: &str, path: &str, offset: u64) -> LakeResult<PathStatus> {
        let (fs, path) = self.locate(filesystem, path)?;
        self.gate.gate("flush")?;
        let node = self.file(&fs, &path)?;
        {
            let mut state = node.file_write().ok_or_else(|| not_a_file(&path))?;
            if state.is_detached() {
                return Err(LakeError::not_found(path.to_string()));
            }
            let before = state.committed_len();
            let storage = self.storage.as_ref();
            let committed = match state.flush(offset, |at, bytes| storage.persist(filesystem, &path, at, bytes)) {
                Ok(committed) => committed,
                Err(err) => {
                    if matches!(&err, LakeError::StorageIo(io) if io.kind() != std::io::ErrorKind::NotFound) {
                        // earlier ranges of a failed flush may already be on disk
                        if let Err(trim) = storage.truncate(filesystem, &path, before) {
                            warn!("could not trim {}/{} to {}: {}", filesystem, path, before, trim);
                        }
                    }
                    return Err(vanished(err, &path));
                }
            };
            if committed != before {
                node.touch();
                debug!("flush {}/{} {} -> {}", filesystem, path, before, committed);
            }
        }
        fs.touch();
        Ok(PathStatus::of(&node, &path))
    }

    /// Read `len` committed bytes starting at `start`.
    pub fn read(&self, filesystem: &str, path: &str, start: u64, len: u64) -> LakeResult<Vec<u8>> {
        self.read_committed(filesystem, path, start, Some(len))
    }

    /// Whole committed content of a file.
    pub fn read_all(&self, filesystem: &str, path: &str) -> LakeResult<Vec<u8>> {
        self.read_committed(filesystem, path, 0, None)
    }

    /// Length and bytes come from one file guard, so a concurrent
    /// re-create cannot shrink the file in between.
    fn read_committed(&self, filesystem: &str, path: &str, start: u64, len: Option<u64>) -> LakeResult<Vec<u8>> {
        let (fs, path) = self.locate(filesystem, path)?;
        let node = self.file(&fs, &path)?;
        let state = node.file_read().ok_or_else(|| not_a_file(&path))?;
        if state.is_detached() {
            return Err(LakeError::not_found(path.to_string()));
        }
        let len = len.unwrap_or_else(|| state.committed_len().saturating_sub(start));
        let storage = self.storage.as_ref();
        state
            .read(start, len, |at, n| storage.read(filesystem, &path, at, n))
            .map_err(|err| vanished(err, &path))
    }

    /// Write protocol phase of a file.
    pub fn write_phase(&self, filesystem: &str, path: &str) -> LakeResult<WritePhase> {
        let (fs, path) = self.locate(filesystem, path)?;
        let node = self.file(&fs, &path)?;
        let phase = node.file_read().map(|s| s.phase()).ok_or_else(|| not_a_file(&path))?;
        Ok(phase)
    }

    fn locate(&self, filesystem: &str, path: &str) -> LakeResult<(Arc<Filesystem>, LakePath)> {
        let path = LakePath::parse(path)?;
        let fs = self.registry.get(filesystem)?;
        Ok((fs, path))
    }

    fn file(&self, fs: &Filesystem, path: &LakePath) -> LakeResult<Arc<Node>> {
        let node = fs.namespace().resolve(path)?;
        if node.kind() != NodeKind::File {
            return Err(not_a_file(path));
        }
        Ok(node)
    }
}

fn not_a_file(path: &LakePath) -> LakeError {
    LakeError::PathConflict {
        path: path.to_string(),
        existing: NodeKind::Directory,
    }
}

/// A file removed on disk by a concurrent recursive delete shows up as a
/// missing path rather than an I/O failure.
fn vanished(err: LakeError, path: &LakePath) -> LakeError {
    match err {
        LakeError::StorageIo(io) if io.kind() == std::io::ErrorKind::NotFound => {
            LakeError::not_found(path.to_string())
        }
        other => other,
    }
}

// ─────────────────────────────── tests ──────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn lake(chance: f64) -> Lake {
        let cfg = LakeConfig {
            failure_chance: chance,
            seed: Some(7),
            ..LakeConfig::default()
        };
        Lake::with_storage(&cfg, Arc::new(MemoryStorage::default())).expect("lake")
    }

    #[test]
    fn walkthrough_append_flush_read() {
        let lake = lake(0.0);
        lake.create_filesystem("fs1").expect("fs");
        lake.create_path("fs1", "/a/b.txt", NodeKind::File, true).expect("file");
        lake.append("fs1", "/a/b.txt", 0, b"hello").expect("append");
        assert!(matches!(
            lake.append("fs1", "/a/b.txt", 0, b"oops").unwrap_err(),
            LakeError::InvalidOffset { .. }
        ));
        let status = lake.flush("fs1", "/a/b.txt", 5).expect("flush");
        assert_eq!(status.content_length, 5);
        assert_eq!(lake.read("fs1", "/a/b.txt", 0, 5).expect("read"), b"hello");
        assert_eq!(lake.read_all("fs1", "a/b.txt").expect("read"), b"hello");
    }

    #[test]
    fn certain_failure_mutates_nothing() {
        let lake = lake(1.0);
        assert!(matches!(
            lake.create_filesystem("fs1").unwrap_err(),
            LakeError::SimulatedServiceFailure
        ));
        assert!(lake.list_filesystems().is_empty());
    }

    #[test]
    fn content_operations_reject_directories() {
        let lake = lake(0.0);
        lake.create_filesystem("fs1").expect("fs");
        lake.create_path("fs1", "d", NodeKind::Directory, true).expect("dir");
        assert!(lake.append("fs1", "d", 0, b"x").is_err());
        assert!(lake.read("fs1", "d", 0, 0).is_err());
        assert!(lake.write_phase("fs1", "d").is_err());
    }

    #[test]
    fn unknown_filesystem_is_not_found() {
        let lake = lake(0.0);
        assert!(matches!(
            lake.create_path("nope", "a", NodeKind::File, true).unwrap_err(),
            LakeError::NotFound { .. }
        ));
    }
}
