// CLASSIFICATION: COMMUNITY
// Filename: path.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Hierarchical namespace of a single filesystem.
//!
//! Directories own their children through `Arc`; the `parent` link is a
//! `Weak` used only to walk back up for naming. Each directory guards its
//! child map with its own `RwLock`, so structural changes in unrelated
//! subtrees never contend. Locks are always taken top-down (directory
//! before child), which keeps the tree free of lock-order cycles.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{LakeError, LakeResult};
use crate::storage::Storage;
use crate::write::FileState;

const NAME_CHARS: &str = "_-";
const SEGMENT_CHARS: &str = "_-.";

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// Kind of a namespace node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Owns an ordered set of named children.
    Directory,
    /// Holds content; never has children.
    File,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Directory => write!(f, "directory"),
            NodeKind::File => write!(f, "file"),
        }
    }
}

fn allowed(name: &str, extra: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || extra.contains(c))
}

/// Reject filesystem names outside `[A-Za-z0-9_-]`.
pub fn validate_filesystem_name(name: &str) -> LakeResult<()> {
    if allowed(name, NAME_CHARS) {
        Ok(())
    } else {
        Err(LakeError::InvalidName { name: name.into() })
    }
}

/// Validated slash-delimited path inside a filesystem.
///
/// The empty path is the filesystem root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LakePath {
    segments: Vec<String>,
}

impl LakePath {
    /// The filesystem root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path such as `/a/b.txt` or `a/b.txt`. Leading and trailing
    /// slashes are ignored; empty inner segments, `.` and `..` are rejected.
    pub fn parse(raw: &str) -> LakeResult<Self> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        Self::from_segments(trimmed.split('/').map(str::to_string))
    }

    /// Build a path from already split segments, validating each one.
    pub fn from_segments<I>(segments: I) -> LakeResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let segments: Vec<String> = segments.into_iter().collect();
        for seg in &segments {
            if seg == "." || seg == ".." || !allowed(seg, SEGMENT_CHARS) {
                return Err(LakeError::InvalidName { name: seg.clone() });
            }
        }
        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final segment, `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Path of the containing directory, `None` for the root.
    pub fn parent(&self) -> Option<LakePath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Prefix made of the first `n` segments.
    pub fn prefix(&self, n: usize) -> LakePath {
        Self {
            segments: self.segments[..n.min(self.segments.len())].to_vec(),
        }
    }

    /// Extend with one more segment; the caller guarantees validity.
    pub(crate) fn child(&self, name: &str) -> LakePath {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }
}

impl fmt::Display for LakePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Version and modification time of a node.
#[derive(Debug, Clone, Copy)]
pub struct Stamp {
    pub version: u64,
    pub modified: DateTime<Utc>,
}

impl Stamp {
    fn fresh() -> Self {
        Self {
            version: NEXT_VERSION.fetch_add(1, Ordering::Relaxed),
            modified: Utc::now(),
        }
    }

    pub fn etag(&self) -> String {
        format!("\"0x{:X}{:08X}\"", self.modified.timestamp(), self.version)
    }
}

#[derive(Default)]
pub(crate) struct DirState {
    pub(crate) children: BTreeMap<String, Arc<Node>>,
    pub(crate) detached: bool,
}

enum NodeBody {
    Directory(RwLock<DirState>),
    File(RwLock<FileState>),
}

/// A directory or file in the namespace tree.
pub struct Node {
    name: String,
    parent: Weak<Node>,
    body: NodeBody,
    stamp: Mutex<Stamp>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .finish()
    }
}

impl Node {
    fn new(name: &str, parent: Weak<Node>, kind: NodeKind, committed: u64) -> Arc<Node> {
        let body = match kind {
            NodeKind::Directory => NodeBody::Directory(RwLock::new(DirState::default())),
            NodeKind::File => NodeBody::File(RwLock::new(FileState::new(committed))),
        };
        Arc::new(Node {
            name: name.to_string(),
            parent,
            body,
            stamp: Mutex::new(Stamp::fresh()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Directory(_) => NodeKind::Directory,
            NodeBody::File(_) => NodeKind::File,
        }
    }

    /// Full path rebuilt from the parent links.
    pub fn path(&self) -> LakePath {
        let mut segments = Vec::new();
        if self.parent.upgrade().is_some() {
            segments.push(self.name.clone());
        }
        let mut cursor = self.parent.upgrade();
        while let Some(node) = cursor {
            cursor = node.parent.upgrade();
            if cursor.is_some() {
                segments.push(node.name.clone());
            }
        }
        segments.reverse();
        LakePath { segments }
    }

    pub fn stamp(&self) -> Stamp {
        *self.stamp.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn touch(&self) {
        *self.stamp.lock().unwrap_or_else(PoisonError::into_inner) = Stamp::fresh();
    }

    pub(crate) fn dir_read(&self) -> Option<RwLockReadGuard<'_, DirState>> {
        match &self.body {
            NodeBody::Directory(lock) => Some(lock.read().unwrap_or_else(PoisonError::into_inner)),
            NodeBody::File(_) => None,
        }
    }

    pub(crate) fn dir_write(&self) -> Option<RwLockWriteGuard<'_, DirState>> {
        match &self.body {
            NodeBody::Directory(lock) => Some(lock.write().unwrap_or_else(PoisonError::into_inner)),
            NodeBody::File(_) => None,
        }
    }

    pub(crate) fn file_read(&self) -> Option<RwLockReadGuard<'_, FileState>> {
        match &self.body {
            NodeBody::File(lock) => Some(lock.read().unwrap_or_else(PoisonError::into_inner)),
            NodeBody::Directory(_) => None,
        }
    }

    pub(crate) fn file_write(&self) -> Option<RwLockWriteGuard<'_, FileState>> {
        match &self.body {
            NodeBody::File(lock) => Some(lock.write().unwrap_or_else(PoisonError::into_inner)),
            NodeBody::Directory(_) => None,
        }
    }

    /// Committed length for files, zero for directories.
    pub fn content_length(&self) -> u64 {
        self.file_read().map(|s| s.committed_len()).unwrap_or(0)
    }

    /// Mark this node and everything below it as removed. Callers hold the
    /// parent's write lock, so no new child can appear underneath meanwhile.
    fn detach(&self) {
        match &self.body {
            NodeBody::Directory(lock) => {
                detach_dir(&mut lock.write().unwrap_or_else(PoisonError::into_inner));
            }
            NodeBody::File(lock) => {
                lock.write().unwrap_or_else(PoisonError::into_inner).detach();
            }
        }
    }
}

fn detach_dir(state: &mut DirState) {
    state.detached = true;
    for child in std::mem::take(&mut state.children).into_values() {
        child.detach();
    }
}

/// Immediate child of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
}

/// Snapshot of a node's properties.
#[derive(Debug, Clone, Serialize)]
pub struct PathStatus {
    pub name: String,
    pub kind: NodeKind,
    pub content_length: u64,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
}

impl PathStatus {
    pub(crate) fn of(node: &Node, path: &LakePath) -> Self {
        let stamp = node.stamp();
        Self {
            name: path.to_string(),
            kind: node.kind(),
            content_length: node.content_length(),
            last_modified: stamp.modified,
            etag: stamp.etag(),
        }
    }
}

/// Namespace tree of one filesystem.
pub struct Namespace {
    filesystem: String,
    root: Arc<Node>,
}

impl Namespace {
    pub fn new(filesystem: &str) -> Self {
        Self {
            filesystem: filesystem.to_string(),
            root: Node::new("", Weak::new(), NodeKind::Directory, 0),
        }
    }

    pub fn filesystem(&self) -> &str {
        &self.filesystem
    }

    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    /// Walk `path` from the root. Every segment before the last must name a
    /// directory.
    pub fn resolve(&self, path: &LakePath) -> LakeResult<Arc<Node>> {
        let mut node = self.root.clone();
        for seg in path.segments() {
            let next = {
                let state = node.dir_read().ok_or_else(|| LakeError::not_found(path.to_string()))?;
                if state.detached {
                    return Err(LakeError::not_found(path.to_string()));
                }
                state
                    .children
                    .get(seg)
                    .cloned()
                    .ok_or_else(|| LakeError::not_found(path.to_string()))?
            };
            node = next;
        }
        Ok(node)
    }

    /// Create the terminal node of `path`, auto-creating missing
    /// intermediate directories.
    ///
    /// An existing terminal node of the same kind is kept (directories) or
    /// truncated (files) unless `fail_if_exists` is set.
    pub fn create_path(
        &self,
        path: &LakePath,
        kind: NodeKind,
        fail_if_exists: bool,
        storage: &dyn Storage,
    ) -> LakeResult<Arc<Node>> {
        if path.is_root() {
            return if kind == NodeKind::Directory && !fail_if_exists {
                Ok(self.root.clone())
            } else {
                Err(LakeError::PathConflict {
                    path: "/".into(),
                    existing: NodeKind::Directory,
                })
            };
        }
        self.create_below(&self.root, path, 0, kind, fail_if_exists, storage)
    }

    /// One step of `create_path` at `dir`, which holds `path[idx]`.
    ///
    /// The read guard on `dir` stays alive while the walk descends, so every
    /// ancestor of the insertion point is read locked until the new chain is
    /// linked and on disk. A delete needs the write lock of the removed
    /// node's parent and therefore cannot run underneath a create.
    fn create_below(
        &self,
        dir: &Arc<Node>,
        path: &LakePath,
        idx: usize,
        kind: NodeKind,
        fail_if_exists: bool,
        storage: &dyn Storage,
    ) -> LakeResult<Arc<Node>> {
        let segments = path.segments();
        let seg = &segments[idx];
        let last = idx + 1 == segments.len();
        let conflict = || LakeError::PathConflict {
            path: path.prefix(idx).to_string(),
            existing: NodeKind::File,
        };
        {
            let state = dir.dir_read().ok_or_else(conflict)?;
            if state.detached {
                return Err(LakeError::not_found(path.to_string()));
            }
            match state.children.get(seg).cloned() {
                Some(child) if last => {
                    return self.recreate(&child, path, kind, fail_if_exists, storage);
                }
                Some(child) if child.kind() == NodeKind::File => {
                    return Err(LakeError::PathConflict {
                        path: path.prefix(idx + 1).to_string(),
                        existing: NodeKind::File,
                    });
                }
                Some(child) => {
                    return self.create_below(&child, path, idx + 1, kind, fail_if_exists, storage);
                }
                None => {}
            }
        }

        let mut state = dir.dir_write().ok_or_else(conflict)?;
        if state.detached {
            return Err(LakeError::not_found(path.to_string()));
        }
        if state.children.contains_key(seg) {
            // Linked by a racing create between the two guards.
            drop(state);
            return self.create_below(dir, path, idx, kind, fail_if_exists, storage);
        }
        let (head, leaf) = self.graft(dir, path, idx, kind, storage)?;
        state.children.insert(seg.clone(), head);
        drop(state);
        dir.touch();
        info!("created {} {}/{}", kind, self.filesystem, path);
        Ok(leaf)
    }

    /// Build the detached chain for `path[from..]` and materialise it on
    /// disk. Nothing is linked into the tree here.
    fn graft(
        &self,
        parent: &Arc<Node>,
        path: &LakePath,
        from: usize,
        kind: NodeKind,
        storage: &dyn Storage,
    ) -> LakeResult<(Arc<Node>, Arc<Node>)> {
        let segments = path.segments();
        let materialised = match kind {
            NodeKind::Directory => storage.create_dir(&self.filesystem, path),
            NodeKind::File => {
                let dir = path.parent().unwrap_or_default();
                storage
                    .create_dir(&self.filesystem, &dir)
                    .and_then(|_| storage.create_file(&self.filesystem, path))
            }
        };
        if let Err(err) = materialised {
            let head = path.prefix(from + 1);
            if let Err(cleanup) = storage.remove(&self.filesystem, &head) {
                debug!("no partial path to clean up for {}: {}", head, cleanup);
            }
            return Err(err.into());
        }

        let mut head: Option<Arc<Node>> = None;
        let mut cursor = parent.clone();
        for (idx, seg) in segments.iter().enumerate().skip(from) {
            let node_kind = if idx + 1 == segments.len() {
                kind
            } else {
                NodeKind::Directory
            };
            let node = Node::new(seg, Arc::downgrade(&cursor), node_kind, 0);
            if head.is_some() {
                if let Some(mut state) = cursor.dir_write() {
                    state.children.insert(seg.clone(), node.clone());
                }
            } else {
                head = Some(node.clone());
            }
            cursor = node;
        }
        let head = head.unwrap_or_else(|| cursor.clone());
        Ok((head, cursor))
    }

    fn recreate(
        &self,
        existing: &Arc<Node>,
        path: &LakePath,
        kind: NodeKind,
        fail_if_exists: bool,
        storage: &dyn Storage,
    ) -> LakeResult<Arc<Node>> {
        if fail_if_exists || existing.kind() != kind {
            return Err(LakeError::PathConflict {
                path: path.to_string(),
                existing: existing.kind(),
            });
        }
        if kind == NodeKind::File {
            if let Some(mut state) = existing.file_write() {
                storage.create_file(&self.filesystem, path)?;
                state.reset();
            }
            existing.touch();
            info!("overwrote file {}/{}", self.filesystem, path);
        }
        Ok(existing.clone())
    }

    /// Remove `path`. Non-empty directories need `recursive`.
    pub fn delete(&self, path: &LakePath, recursive: bool, storage: &dyn Storage) -> LakeResult<()> {
        let (parent_path, name) = match (path.parent(), path.name()) {
            (Some(parent), Some(name)) => (parent, name),
            _ => {
                return Err(LakeError::RootNotDeletable {
                    filesystem: self.filesystem.clone(),
                })
            }
        };
        let parent = self.resolve(&parent_path)?;
        let mut state = parent
            .dir_write()
            .ok_or_else(|| LakeError::not_found(path.to_string()))?;
        if state.detached {
            return Err(LakeError::not_found(path.to_string()));
        }
        let child = state
            .children
            .get(name)
            .cloned()
            .ok_or_else(|| LakeError::not_found(path.to_string()))?;

        if let Some(mut dir) = child.dir_write() {
            if !recursive && !dir.children.is_empty() {
                warn!("refusing non-recursive delete of {}/{}", self.filesystem, path);
                return Err(LakeError::DirectoryNotEmpty {
                    path: path.to_string(),
                });
            }
            storage.remove(&self.filesystem, path)?;
            state.children.remove(name);
            detach_dir(&mut dir);
        } else if let Some(mut file) = child.file_write() {
            storage.remove(&self.filesystem, path)?;
            state.children.remove(name);
            file.detach();
        }
        drop(state);
        parent.touch();
        info!("deleted {} {}/{}", child.kind(), self.filesystem, path);
        Ok(())
    }

    /// Immediate children of a directory, in name order.
    pub fn list(&self, path: &LakePath) -> LakeResult<Vec<DirEntry>> {
        let node = self.resolve(path)?;
        let state = node.dir_read().ok_or_else(|| LakeError::NotADirectory {
            path: path.to_string(),
        })?;
        if state.detached {
            return Err(LakeError::not_found(path.to_string()));
        }
        Ok(state
            .children
            .iter()
            .map(|(name, child)| DirEntry {
                name: name.clone(),
                kind: child.kind(),
            })
            .collect())
    }

    /// Descendants of a directory with full path names: depth first when
    /// `recursive`, immediate children otherwise.
    pub fn list_paths(&self, path: &LakePath, recursive: bool) -> LakeResult<Vec<PathStatus>> {
        let node = self.resolve(path)?;
        if node.kind() != NodeKind::Directory {
            return Err(LakeError::NotADirectory {
                path: path.to_string(),
            });
        }
        let mut out = Vec::new();
        collect(&node, path, recursive, &mut out);
        Ok(out)
    }

    /// Properties of the node at `path`.
    pub fn status(&self, path: &LakePath) -> LakeResult<PathStatus> {
        let node = self.resolve(path)?;
        Ok(PathStatus::of(&node, path))
    }

    /// Insert a node found on disk at startup, creating parents as needed.
    pub(crate) fn adopt(&self, path: &LakePath, kind: NodeKind, committed: u64) -> LakeResult<()> {
        let segments = path.segments();
        let mut dir = self.root.clone();
        for (idx, seg) in segments.iter().enumerate() {
            let last = idx + 1 == segments.len();
            let next = {
                let mut state = dir.dir_write().ok_or_else(|| LakeError::PathConflict {
                    path: path.prefix(idx).to_string(),
                    existing: NodeKind::File,
                })?;
                let node_kind = if last { kind } else { NodeKind::Directory };
                state
                    .children
                    .entry(seg.clone())
                    .or_insert_with(|| {
                        Node::new(seg, Arc::downgrade(&dir), node_kind, if last { committed } else { 0 })
                    })
                    .clone()
            };
            dir = next;
        }
        Ok(())
    }

    /// Remove every node of the filesystem from storage and detach the tree.
    ///
    /// The root write lock is held across the storage call, so no create can
    /// be rebuilding paths on disk while they are removed.
    pub(crate) fn retire(&self, storage: &dyn Storage) -> LakeResult<()> {
        let mut root = self
            .root
            .dir_write()
            .ok_or_else(|| LakeError::not_found(self.filesystem.clone()))?;
        storage.remove_filesystem(&self.filesystem)?;
        detach_dir(&mut root);
        Ok(())
    }
}

fn collect(node: &Arc<Node>, path: &LakePath, recursive: bool, out: &mut Vec<PathStatus>) {
    let children: Vec<(String, Arc<Node>)> = match node.dir_read() {
        Some(state) if !state.detached => state
            .children
            .iter()
            .map(|(name, child)| (name.clone(), child.clone()))
            .collect(),
        _ => return,
    };
    for (name, child) in children {
        let child_path = path.child(&name);
        out.push(PathStatus::of(&child, &child_path));
        if recursive && child.kind() == NodeKind::Directory {
            collect(&child, &child_path, recursive, out);
        }
    }
}
