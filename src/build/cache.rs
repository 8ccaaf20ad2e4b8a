//! Content-addressed build cache.
//!
//! Each record lives at `<root>/<key>/<hash>/` where `<key>` identifies what
//! was computed and `<hash>` is derived from every input that went into it,
//! the step version, and the cache's global hash. A record holds:
//!
//! - `info.json`: the [`CachedInfo`] envelope with the entry, its dependency
//!   entries, and the step's serialized data
//! - `files/`: artifacts the step produced, if any
//!
//! Writes go through a temp file and a rename so a crashed build never leaves
//! a half-written record behind. Lookups are read-only and may run in
//! parallel.

use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::content::ids::{AssetId, Hash128, HashBuilder};
use crate::content::service::{ContentError, ContentService};

/// Name of the record envelope file.
pub const CACHE_INFO_FILENAME: &str = "info.json";

/// Directory holding a record's artifacts.
pub const ARTIFACT_DIRNAME: &str = "files";

/// Error during cache operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Content(#[from] ContentError),
}

/// What a cache entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A source asset and everything it depends on
    Asset,
    /// Derived data computed by a step
    Data,
    /// A file produced by a step
    File,
}

/// Key of a cache record.
///
/// Two entries are equal when both `key` and `hash` match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: Hash128,
    pub hash: Hash128,
    pub kind: EntryKind,
    pub version: u32,
}

impl PartialEq for CacheEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.hash == other.hash
    }
}

impl Eq for CacheEntry {}

impl std::hash::Hash for CacheEntry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.hash.hash(state);
    }
}

impl CacheEntry {
    /// Entry for derived data. The hash covers `version` and every input.
    pub fn data(key: Hash128, version: u32, inputs: &[Hash128]) -> Self {
        Self::with_kind(EntryKind::Data, key, version, inputs)
    }

    /// Entry for a produced file.
    pub fn file(key: Hash128, version: u32, inputs: &[Hash128]) -> Self {
        Self::with_kind(EntryKind::File, key, version, inputs)
    }

    /// Entry recording only the current source hash of an asset.
    pub fn asset_source(asset: &AssetId, source_hash: Hash128) -> Self {
        Self { key: asset.hash(), hash: source_hash, kind: EntryKind::Asset, version: 0 }
    }

    fn with_kind(kind: EntryKind, key: Hash128, version: u32, inputs: &[Hash128]) -> Self {
        let mut builder = HashBuilder::new();
        builder.u32(version);
        for input in inputs {
            builder.hash(input);
        }
        Self { key, hash: builder.finish(), kind, version }
    }
}

/// On-disk envelope of a cache record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedInfo<T> {
    pub entry: CacheEntry,
    #[serde(default)]
    pub dependencies: Vec<CacheEntry>,
    pub data: T,
}

/// Counters for cache activity over a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub saves: usize,
    pub save_failures: usize,
}

/// A build cache rooted at a directory.
#[derive(Debug)]
pub struct BuildCache {
    root: PathBuf,
    global_hash: Hash128,
    write_lock: Mutex<()>,
    temp_counter: AtomicUsize,
    hits: AtomicUsize,
    misses: AtomicUsize,
    saves: AtomicUsize,
    save_failures: AtomicUsize,
}

impl BuildCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            global_hash: Hash128::ZERO,
            write_lock: Mutex::new(()),
            temp_counter: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
            save_failures: AtomicUsize::new(0),
        }
    }

    /// Mix a global hash into every record location. Changing it invalidates
    /// the whole cache without deleting anything.
    pub fn with_global_hash(mut self, hash: Hash128) -> Self {
        self.global_hash = hash;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn global_hash(&self) -> Hash128 {
        self.global_hash
    }

    /// Entry for an asset covering its own content and every asset it
    /// transitively depends on. `extra` inputs are mixed in after.
    pub fn asset_entry(
        &self,
        service: &dyn ContentService,
        asset: &AssetId,
        version: u32,
        extra: &[Hash128],
    ) -> Result<CacheEntry, ContentError> {
        let mut closure = BTreeSet::new();
        let mut pending = service.asset_dependencies(asset)?;
        while let Some(next) = pending.pop() {
            if next == *asset || !closure.insert(next) {
                continue;
            }
            pending.extend(service.asset_dependencies(&next)?);
        }

        let mut builder = HashBuilder::new();
        builder.u32(version).hash(&service.asset_hash(asset)?);
        for dependency in &closure {
            builder.hash(&dependency.hash()).hash(&service.asset_hash(dependency)?);
        }
        for input in extra {
            builder.hash(input);
        }

        Ok(CacheEntry { key: asset.hash(), hash: builder.finish(), kind: EntryKind::Asset, version })
    }

    /// Directory of the record for `entry`.
    pub fn entry_dir(&self, entry: &CacheEntry) -> PathBuf {
        let mut builder = HashBuilder::new();
        builder.hash(&entry.hash).hash(&self.global_hash).u32(entry.version);
        self.root.join(entry.key.to_hex()).join(builder.finish().to_hex())
    }

    /// Directory for the artifacts of `entry`.
    pub fn artifact_dir(&self, entry: &CacheEntry) -> PathBuf {
        self.entry_dir(entry).join(ARTIFACT_DIRNAME)
    }

    /// Load the record for `entry`. Any failure is reported as a miss.
    pub fn try_load<T: DeserializeOwned>(&self, entry: &CacheEntry) -> Option<CachedInfo<T>> {
        let path = self.entry_dir(entry).join(CACHE_INFO_FILENAME);
        let loaded = fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<CachedInfo<T>>(&bytes).ok())
            .filter(|info| info.entry == *entry && info.entry.version == entry.version);

        match loaded {
            Some(info) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %entry.key, "cache hit");
                Some(info)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %entry.key, "cache miss");
                None
            }
        }
    }

    /// Load several records, optionally on the rayon pool. Results keep the
    /// order of `entries`.
    pub fn try_load_many<T>(&self, entries: &[CacheEntry], parallel: bool) -> Vec<Option<CachedInfo<T>>>
    where
        T: DeserializeOwned + Send,
    {
        if parallel {
            entries.par_iter().map(|entry| self.try_load(entry)).collect()
        } else {
            entries.iter().map(|entry| self.try_load(entry)).collect()
        }
    }

    /// Store a record. Returns false and logs a warning on failure; the build
    /// itself never fails because of the cache.
    pub fn try_save<T: Serialize>(&self, entry: &CacheEntry, dependencies: Vec<CacheEntry>, data: &T) -> bool {
        let info = CachedInfo { entry: *entry, dependencies, data };
        match self.write_info(&info) {
            Ok(()) => {
                self.saves.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(err) => {
                self.save_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %entry.key, error = %err, "failed to store cache record");
                false
            }
        }
    }

    fn write_info<T: Serialize>(&self, info: &CachedInfo<&T>) -> Result<(), CacheError> {
        let dir = self.entry_dir(&info.entry);
        let bytes = serde_json::to_vec_pretty(info)?;

        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        fs::create_dir_all(&dir)?;
        let counter = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp = dir.join(format!("{}.tmp-{}-{}", CACHE_INFO_FILENAME, std::process::id(), counter));
        fs::write(&temp, bytes)?;
        if let Err(err) = fs::rename(&temp, dir.join(CACHE_INFO_FILENAME)) {
            let _ = fs::remove_file(&temp);
            return Err(err.into());
        }
        Ok(())
    }

    /// Copy files into the artifact directory of `entry`, returning the new
    /// paths in the same order.
    pub fn store_artifacts(&self, entry: &CacheEntry, files: &[PathBuf]) -> Result<Vec<PathBuf>, CacheError> {
        let dir = self.artifact_dir(entry);
        fs::create_dir_all(&dir)?;
        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            let name = file.file_name().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("no file name: {}", file.display()))
            })?;
            let target = dir.join(name);
            if *file != target {
                fs::copy(file, &target)?;
            }
            stored.push(target);
        }
        Ok(stored)
    }

    /// Whether any dependency entry differs from its current state.
    /// `current` maps a recorded entry to its present-day counterpart, or
    /// `None` if it can no longer be computed.
    pub fn has_changed<F>(&self, dependencies: &[CacheEntry], current: F) -> bool
    where
        F: Fn(&CacheEntry) -> Option<CacheEntry>,
    {
        dependencies.iter().any(|recorded| match current(recorded) {
            Some(now) => now != *recorded,
            None => true,
        })
    }

    /// Delete every record.
    pub fn purge(&self) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            saves: self.saves.load(Ordering::Relaxed),
            save_failures: self.save_failures.load(Ordering::Relaxed),
        }
    }
}
