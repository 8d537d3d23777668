// CLASSIFICATION: COMMUNITY
// Filename: registry.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Filesystem registry.
//!
//! Maps filesystem names to independent namespace trees and keeps the
//! per-filesystem properties that are mirrored into the storage manifest.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{LakeError, LakeResult};
use crate::path::{validate_filesystem_name, Namespace};
use crate::storage::Storage;

/// Properties reported for a filesystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesystemProperties {
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// User metadata from `x-ms-properties`, value kept as sent.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl FilesystemProperties {
    fn now() -> Self {
        let now = Utc::now();
        Self {
            created: now,
            last_modified: now,
            metadata: BTreeMap::new(),
        }
    }

    pub fn etag(&self) -> String {
        format!(
            "\"0x{:X}\"",
            self.last_modified.timestamp_nanos_opt().unwrap_or_default()
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    name: String,
    #[serde(flatten)]
    properties: FilesystemProperties,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    filesystems: Vec<ManifestEntry>,
}

/// A registered filesystem.
pub struct Filesystem {
    name: String,
    seq: u64,
    namespace: Namespace,
    properties: Mutex<FilesystemProperties>,
}

impl std::fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filesystem")
            .field("name", &self.name)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl Filesystem {
    fn new(name: &str, seq: u64, properties: FilesystemProperties) -> Self {
        Self {
            name: name.to_string(),
            seq,
            namespace: Namespace::new(name),
            properties: Mutex::new(properties),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn properties(&self) -> FilesystemProperties {
        self.props().clone()
    }

    fn props(&self) -> MutexGuard<'_, FilesystemProperties> {
        self.properties.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn touch(&self) {
        self.props().last_modified = Utc::now();
    }
}

/// Snapshot of registered filesystems in creation order.
///
/// Iterating does not hold any registry lock and can be repeated.
#[derive(Clone)]
pub struct FilesystemListing {
    entries: Vec<Arc<Filesystem>>,
}

impl FilesystemListing {
    /// Names in creation order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|fs| fs.name())
    }

    /// Filesystems in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Filesystem>> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a FilesystemListing {
    type Item = &'a Arc<Filesystem>;
    type IntoIter = std::slice::Iter<'a, Arc<Filesystem>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Registry of filesystems by name.
#[derive(Default)]
pub struct Registry {
    filesystems: RwLock<HashMap<String, Arc<Filesystem>>>,
    next_seq: AtomicU64,
    manifest: Mutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new filesystem and create its storage directory.
    pub fn create(&self, name: &str, storage: &dyn Storage) -> LakeResult<Arc<Filesystem>> {
        validate_filesystem_name(name)?;
        let mut map = self.filesystems.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(name) {
            return Err(LakeError::AlreadyExists { name: name.into() });
        }
        storage.create_filesystem(name)?;
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let fs = Arc::new(Filesystem::new(name, seq, FilesystemProperties::now()));
        map.insert(name.to_string(), fs.clone());
        if let Err(err) = self.write_manifest(&map, storage) {
            map.remove(name);
            if let Err(cleanup) = storage.remove_filesystem(name) {
                warn!("could not roll back filesystem {}: {}", name, cleanup);
            }
            return Err(err);
        }
        info!("created filesystem {}", name);
        Ok(fs)
    }

    /// Look up a filesystem by name.
    pub fn get(&self, name: &str) -> LakeResult<Arc<Filesystem>> {
        self.filesystems
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| LakeError::NotFound { name: name.into() })
    }

    /// Remove a filesystem with every node and persisted byte under it.
    pub fn delete(&self, name: &str, storage: &dyn Storage) -> LakeResult<()> {
        let mut map = self.filesystems.write().unwrap_or_else(PoisonError::into_inner);
        let fs = map
            .get(name)
            .cloned()
            .ok_or_else(|| LakeError::NotFound { name: name.into() })?;
        map.remove(name);
        if let Err(err) = self.write_manifest(&map, storage) {
            map.insert(name.to_string(), fs);
            return Err(err);
        }
        if let Err(err) = fs.namespace().retire(storage) {
            map.insert(name.to_string(), fs);
            if let Err(restore) = self.write_manifest(&map, storage) {
                error!("manifest lost filesystem {} after failed delete: {}", name, restore);
            }
            return Err(err);
        }
        info!("deleted filesystem {}", name);
        Ok(())
    }

    /// Snapshot of all filesystems in creation order.
    pub fn list(&self) -> FilesystemListing {
        let mut entries: Vec<Arc<Filesystem>> = self
            .filesystems
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        entries.sort_by_key(|fs| fs.seq);
        FilesystemListing { entries }
    }

    /// Replace the user metadata of a filesystem.
    pub fn set_metadata(
        &self,
        name: &str,
        metadata: BTreeMap<String, String>,
        storage: &dyn Storage,
    ) -> LakeResult<FilesystemProperties> {
        let map = self.filesystems.read().unwrap_or_else(PoisonError::into_inner);
        let fs = map
            .get(name)
            .ok_or_else(|| LakeError::NotFound { name: name.into() })?;
        let previous = {
            let mut props = fs.props();
            let previous = props.clone();
            props.metadata = metadata;
            props.last_modified = Utc::now();
            previous
        };
        if let Err(err) = self.write_manifest(&map, storage) {
            *fs.props() = previous;
            return Err(err);
        }
        Ok(fs.properties())
    }

    /// Persist the registry to the manifest. Callers hold the map lock.
    fn write_manifest(
        &self,
        map: &HashMap<String, Arc<Filesystem>>,
        storage: &dyn Storage,
    ) -> LakeResult<()> {
        let _serial = self.manifest.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<&Arc<Filesystem>> = map.values().collect();
        entries.sort_by_key(|fs| fs.seq);
        let manifest = Manifest {
            filesystems: entries
                .into_iter()
                .map(|fs| ManifestEntry {
                    name: fs.name.clone(),
                    properties: fs.properties(),
                })
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| LakeError::StorageIo(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        storage.store_manifest(&bytes)?;
        Ok(())
    }

    /// Rebuild the registry from storage: manifest entries first (keeping
    /// their order and properties), then unlisted directories.
    pub fn recover(&self, storage: &dyn Storage) -> LakeResult<usize> {
        let manifest: Manifest = match storage.load_manifest()? {
            Some(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                warn!("ignoring unreadable manifest: {}", err);
                Manifest::default()
            }),
            None => Manifest::default(),
        };
        let present = storage.filesystems()?;
        let mut map = self.filesystems.write().unwrap_or_else(PoisonError::into_inner);

        let listed = manifest
            .filesystems
            .into_iter()
            .filter(|entry| present.contains(&entry.name))
            .map(|entry| (entry.name, entry.properties));
        let adopted = present
            .iter()
            .map(|name| (name.clone(), FilesystemProperties::now()));
        for (name, properties) in listed.chain(adopted) {
            if map.contains_key(&name) {
                continue;
            }
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            let fs = Arc::new(Filesystem::new(&name, seq, properties));
            for node in storage.scan(&name)? {
                if let Err(err) = fs.namespace().adopt(&node.path, node.kind, node.len) {
                    warn!("skipping {}/{} during recovery: {}", name, node.path, err);
                }
            }
            info!("recovered filesystem {}", name);
            map.insert(name, fs);
        }
        self.write_manifest(&map, storage)?;
        Ok(map.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{LakePath, NodeKind};
    use crate::storage::MemoryStorage;

    #[test]
    fn create_get_delete() {
        let storage = MemoryStorage::default();
        let registry = Registry::new();
        registry.create("fs1", &storage).expect("create");
        assert!(matches!(
            registry.create("fs1", &storage).unwrap_err(),
            LakeError::AlreadyExists { .. }
        ));
        assert_eq!(registry.get("fs1").expect("get").name(), "fs1");
        registry.delete("fs1", &storage).expect("delete");
        assert!(matches!(
            registry.get("fs1").unwrap_err(),
            LakeError::NotFound { .. }
        ));
        assert!(matches!(
            registry.delete("fs1", &storage).unwrap_err(),
            LakeError::NotFound { .. }
        ));
    }

    #[test]
    fn listing_keeps_creation_order_and_restarts() {
        let storage = MemoryStorage::default();
        let registry = Registry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.create(name, &storage).expect("create");
        }
        let listing = registry.list();
        let first: Vec<&str> = listing.names().collect();
        let second: Vec<&str> = listing.names().collect();
        assert_eq!(first, ["zeta", "alpha", "mid"]);
        assert_eq!(first, second);
    }

    #[test]
    fn storage_failure_leaves_registry_untouched() {
        let storage = MemoryStorage::default();
        let registry = Registry::new();
        storage.fail_writes(true);
        assert!(matches!(
            registry.create("fs1", &storage).unwrap_err(),
            LakeError::StorageIo(_)
        ));
        assert!(registry.list().is_empty());
    }

    #[test]
    fn failed_delete_keeps_filesystem_and_reports_error() {
        let storage = MemoryStorage::default();
        let registry = Registry::new();
        registry.create("fs1", &storage).expect("create");
        storage.fail_writes(true);
        assert!(matches!(
            registry.delete("fs1", &storage).unwrap_err(),
            LakeError::StorageIo(_)
        ));
        assert_eq!(registry.get("fs1").expect("still registered").name(), "fs1");
        assert_eq!(storage.filesystems().expect("names"), ["fs1"]);

        storage.fail_writes(false);
        registry.delete("fs1", &storage).expect("delete");
        let rebuilt = Registry::new();
        assert_eq!(rebuilt.recover(&storage).expect("recover"), 0);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let storage = MemoryStorage::default();
        let registry = Registry::new();
        assert!(matches!(
            registry.create("bad.name", &storage).unwrap_err(),
            LakeError::InvalidName { .. }
        ));
    }

    #[test]
    fn recover_rebuilds_trees_and_properties() {
        let storage = MemoryStorage::default();
        let registry = Registry::new();
        let fs = registry.create("fs1", &storage).expect("create");
        let mut meta = BTreeMap::new();
        meta.insert("owner".to_string(), "dGVzdA==".to_string());
        registry.set_metadata("fs1", meta.clone(), &storage).expect("meta");
        let path = LakePath::parse("a/b.txt").expect("path");
        fs.namespace()
            .create_path(&path, NodeKind::File, true, &storage)
            .expect("file");
        storage.persist("fs1", &path, 0, b"hey").expect("persist");
        storage.create_filesystem("stray").expect("stray");

        let rebuilt = Registry::new();
        assert_eq!(rebuilt.recover(&storage).expect("recover"), 2);
        let names: Vec<String> = rebuilt.list().names().map(str::to_string).collect();
        assert_eq!(names, ["fs1", "stray"]);
        let fs = rebuilt.get("fs1").expect("fs1");
        assert_eq!(fs.properties().metadata, meta);
        let node = fs.namespace().resolve(&path).expect("node");
        assert_eq!(node.content_length(), 3);
    }
}
