//! Cache-on-read filesystem and the observed-path tracker.
//!
//! During init, every file the script reads is copied from the base layer
//! into the cache and its path recorded. Sealing flips the filesystem into
//! the replay state: the base is never consulted again and paths that were
//! never served fail with [`FsError::PathNeverRequestedBefore`], so a test
//! cannot read files on the replay host that it did not declare at init.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::path::normalize_and_anonymize;
use crate::{FileEntry, FileInfo, Fs, FsError, FsResult, InMemoryFs};

/// Set of normalized paths successfully read through a [`CacheOnReadFs`].
///
/// `record` may be called concurrently; `seal` is a one-way transition
/// after which the set no longer grows.
#[derive(Debug, Default)]
pub struct ObservedPaths {
    seen: RwLock<HashSet<String>>,
    sealed: AtomicBool,
}

impl ObservedPaths {
    fn record(&self, path: &str) {
        if self.sealed.load(Ordering::Acquire) {
            return;
        }
        self.seen
            .write()
            .expect("observed-path lock poisoned")
            .insert(path.to_string());
    }

    /// Whether `path` was read before sealing.
    pub fn contains(&self, path: &str) -> bool {
        self.seen
            .read()
            .expect("observed-path lock poisoned")
            .contains(&normalize_and_anonymize(path))
    }

    /// Number of recorded paths.
    pub fn len(&self) -> usize {
        self.seen.read().expect("observed-path lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }
}

/// Two-layer filesystem: reads are served from `cache` when present, and
/// on a miss copied out of `base` into `cache`. Writes only ever touch
/// `cache`. Once sealed, only cached paths remain readable.
pub struct CacheOnReadFs {
    base: Arc<dyn Fs>,
    cache: InMemoryFs,
    observed: ObservedPaths,
}

impl CacheOnReadFs {
    pub fn new(base: Arc<dyn Fs>, cache: InMemoryFs) -> Self {
        Self {
            base,
            cache,
            observed: ObservedPaths::default(),
        }
    }

    /// Rebuild the replay-side state from a bundle's file tree: already
    /// sealed, with every cached path counting as observed.
    pub fn sealed(cache: InMemoryFs) -> Self {
        let fs = Self::new(Arc::new(InMemoryFs::new()), cache);
        for path in fs.cache.snapshot().keys() {
            fs.observed.record(path);
        }
        fs.observed.seal();
        fs
    }

    /// Paths read through this filesystem so far.
    pub fn observed(&self) -> &ObservedPaths {
        &self.observed
    }
}

impl Fs for CacheOnReadFs {
    fn read(&self, path: &str) -> FsResult<Vec<u8>> {
        let path = normalize_and_anonymize(path);
        if self.observed.is_sealed() {
            return match self.cache.read(&path) {
                Err(FsError::NotFound { path }) => {
                    Err(FsError::PathNeverRequestedBefore { path })
                }
                other => other,
            };
        }

        match self.cache.read(&path) {
            Ok(data) => {
                self.observed.record(&path);
                Ok(data)
            }
            Err(FsError::NotFound { .. }) => {
                let data = self.base.read(&path)?;
                // Concurrent first reads of the same path race here; the
                // insert is guarded so the cache is populated at most once,
                // and every racer carries identical bytes anyway.
                if self.cache.write_if_absent(&path, &data, 0o644) {
                    debug!(path = path.as_str(), "cached file on first read");
                }
                self.observed.record(&path);
                Ok(data)
            }
            Err(other) => Err(other),
        }
    }

    fn write(&self, path: &str, data: &[u8], mode: u32) -> FsResult<()> {
        self.cache.write(path, data, mode)
    }

    fn stat(&self, path: &str) -> FsResult<FileInfo> {
        let path = normalize_and_anonymize(path);
        if self.observed.is_sealed() {
            return match self.cache.stat(&path) {
                Err(FsError::NotFound { path }) => {
                    Err(FsError::PathNeverRequestedBefore { path })
                }
                other => other,
            };
        }
        match self.cache.stat(&path) {
            Err(FsError::NotFound { .. }) => self.base.stat(&path),
            other => other,
        }
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<FileInfo>> {
        let path = normalize_and_anonymize(path);
        if self.observed.is_sealed() {
            return match self.cache.read_dir(&path) {
                Err(FsError::NotFound { path }) => {
                    Err(FsError::PathNeverRequestedBefore { path })
                }
                other => other,
            };
        }

        // Union of both layers; the cache wins on name collisions.
        let cached = self.cache.read_dir(&path);
        let based = self.base.read_dir(&path);
        match (cached, based) {
            (Err(FsError::NotFound { .. }), based) => based,
            (cached, Err(FsError::NotFound { .. })) => cached,
            (Err(e), _) | (_, Err(e)) => Err(e),
            (Ok(cached), Ok(based)) => {
                let mut merged: BTreeMap<String, FileInfo> = BTreeMap::new();
                for info in based.into_iter().chain(cached) {
                    merged.insert(info.name.clone(), info);
                }
                Ok(merged.into_values().collect())
            }
        }
    }

    fn is_dir(&self, path: &str) -> FsResult<bool> {
        let path = normalize_and_anonymize(path);
        if self.observed.is_sealed() {
            // Same sealed-miss shape as read/stat: the sentinel, never a
            // bare NotFound.
            return match self.cache.is_dir(&path) {
                Err(FsError::NotFound { path }) => {
                    Err(FsError::PathNeverRequestedBefore { path })
                }
                other => other,
            };
        }
        match self.cache.is_dir(&path) {
            Err(FsError::NotFound { .. }) => self.base.is_dir(&path),
            other => other,
        }
    }

    fn snapshot(&self) -> BTreeMap<String, FileEntry> {
        self.cache.snapshot()
    }

    fn seal(&self) {
        self.observed.seal();
        debug!(observed = self.observed.len(), "sealed cache-on-read filesystem");
    }
}
