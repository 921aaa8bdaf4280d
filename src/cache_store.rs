//! On-disk cache of downloaded objects
//!
//! Objects live under `<cache_dir>/<bucket>/<key>`. A single JSON document,
//! [`INDEX_FILE_NAME`], records one [`CacheEntry`] per cached object and is
//! rewritten in full after every mutation. All index access goes through one
//! mutex, so a read-modify-write of the document is never interleaved.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::types::ObjectRef;
use crate::{ProxyError, Result};

pub const INDEX_FILE_NAME: &str = "cache_metadata.json";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metadata of one cached object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Seconds since the Unix epoch of the last download or cache hit
    pub last_access: f64,
    /// Size of the backing file in bytes
    pub size: u64,
    /// URL the object was downloaded from
    pub source_url: String,
}

/// The persisted index document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheIndex {
    /// Relative cache path (`bucket/key`) to entry
    #[serde(default)]
    pub files: BTreeMap<String, CacheEntry>,
}

#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    index_path: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    index: Mutex<CacheIndex>,
    /// Clock reading of the last completed sweep
    last_sweep: Mutex<Option<f64>>,
}

impl CacheStore {
    /// Open (or create) the cache directory and load its index
    ///
    /// An unreadable index document is replaced by an empty one; the files it
    /// referenced become unknown to the cache and are overwritten on demand.
    pub fn open(root: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let index_path = root.join(INDEX_FILE_NAME);
        let index = load_index(&index_path);
        tracing::info!(
            cache_dir = %root.display(),
            entries = index.files.len(),
            "opened object cache"
        );
        Ok(Self {
            root,
            index_path,
            ttl,
            clock,
            index: Mutex::new(index),
            last_sweep: Mutex::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Relative cache path of an object: `<bucket>/<key>`
    pub fn relative_path(object: &ObjectRef) -> Result<String> {
        validate_segment(object.bucket(), object)?;
        for segment in object.key().split('/') {
            validate_segment(segment, object)?;
        }
        Ok(format!("{}/{}", object.bucket(), object.key()))
    }

    fn full_path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    /// Local path of a fresh cached copy, touching it; `None` on a miss
    ///
    /// A hit requires an index entry, a backing file on disk, and an access
    /// younger than the TTL. An entry whose file disappeared is dropped.
    pub fn lookup(&self, object: &ObjectRef) -> Result<Option<PathBuf>> {
        let relative = Self::relative_path(object)?;
        let path = self.full_path(&relative);
        let now = self.clock.now_secs();

        let mut index = self.index.lock();
        let Some(entry) = index.files.get_mut(&relative) else {
            return Ok(None);
        };

        if !path.is_file() {
            tracing::debug!(object = %object, "cache entry without backing file, dropping");
            index.files.remove(&relative);
            self.persist_best_effort(&index);
            return Ok(None);
        }

        if now - entry.last_access >= self.ttl.as_secs_f64() {
            tracing::debug!(object = %object, "cache entry expired");
            return Ok(None);
        }

        entry.last_access = entry.last_access.max(now);
        self.persist_best_effort(&index);
        tracing::debug!(object = %object, path = %path.display(), "cache hit");
        Ok(Some(path))
    }

    /// Store `bytes` as the cached copy of `object`
    pub fn put(&self, object: &ObjectRef, bytes: &[u8], source_url: &str) -> Result<PathBuf> {
        let mut reader = bytes;
        self.put_reader(object, &mut reader, source_url)
    }

    /// Stream `reader` into the cached copy of `object`
    ///
    /// The body is written to a temporary sibling first and renamed over the
    /// final path, so readers never observe a partially written file.
    pub fn put_reader(
        &self,
        object: &ObjectRef,
        reader: &mut dyn Read,
        source_url: &str,
    ) -> Result<PathBuf> {
        let relative = Self::relative_path(object)?;
        let path = self.full_path(&relative);
        let parent = path
            .parent()
            .ok_or_else(|| ProxyError::Internal(format!("cache path without parent: {relative}")))?;
        fs::create_dir_all(parent)?;

        let tmp = temp_sibling(&path);
        let size = match write_synced(&tmp, reader) {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e.into());
            }
        };

        let mut index = self.index.lock();
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        index.files.insert(
            relative,
            CacheEntry {
                last_access: self.clock.now_secs(),
                size,
                source_url: source_url.to_string(),
            },
        );
        self.persist(&index)?;
        tracing::debug!(object = %object, size, path = %path.display(), "stored object in cache");
        Ok(path)
    }

    /// Refresh the last access time; returns whether an entry existed
    pub fn touch(&self, object: &ObjectRef) -> Result<bool> {
        let relative = Self::relative_path(object)?;
        let now = self.clock.now_secs();
        let mut index = self.index.lock();
        match index.files.get_mut(&relative) {
            Some(entry) => {
                entry.last_access = entry.last_access.max(now);
                self.persist(&index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Evict every entry not accessed within `ttl`; returns how many were removed
    ///
    /// A file that cannot be deleted is logged and its entry kept, so a later
    /// sweep retries it. Remaining entries are still processed.
    pub fn sweep(&self, ttl: Duration) -> Result<usize> {
        let now = self.clock.now_secs();
        let max_age = ttl.as_secs_f64();
        let mut index = self.index.lock();

        let expired: Vec<String> = index
            .files
            .iter()
            .filter(|(_, entry)| now - entry.last_access > max_age)
            .map(|(relative, _)| relative.clone())
            .collect();

        let mut removed = 0;
        for relative in expired {
            let path = self.full_path(&relative);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to remove expired cache file"
                    );
                    continue;
                }
            }
            index.files.remove(&relative);
            removed += 1;
        }

        if removed > 0 {
            self.persist(&index)?;
            tracing::info!(removed, remaining = index.files.len(), "swept expired cache files");
        }
        *self.last_sweep.lock() = Some(now);
        Ok(removed)
    }

    /// Sweep with the store TTL unless a sweep already ran within `interval`
    ///
    /// Returns `None` when no sweep was due.
    pub fn sweep_if_due(&self, interval: Duration) -> Result<Option<usize>> {
        let now = self.clock.now_secs();
        let due = match *self.last_sweep.lock() {
            Some(last) => now - last >= interval.as_secs_f64(),
            None => true,
        };
        if !due {
            return Ok(None);
        }
        self.sweep_expired().map(Some)
    }

    /// Sweep with the TTL the store was opened with
    pub fn sweep_expired(&self) -> Result<usize> {
        self.sweep(self.ttl)
    }

    pub fn entry(&self, object: &ObjectRef) -> Option<CacheEntry> {
        let relative = Self::relative_path(object).ok()?;
        self.index.lock().files.get(&relative).cloned()
    }

    pub fn len(&self) -> usize {
        self.index.lock().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, index: &CacheIndex) -> Result<()> {
        let bytes = serde_json::to_vec(index)?;
        let tmp = temp_sibling(&self.index_path);
        if let Err(e) = write_synced(&tmp, &mut bytes.as_slice()) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        fs::rename(&tmp, &self.index_path)?;
        Ok(())
    }

    fn persist_best_effort(&self, index: &CacheIndex) {
        if let Err(e) = self.persist(index) {
            tracing::warn!(error = %e, "failed to save cache index");
        }
    }
}

fn load_index(path: &Path) -> CacheIndex {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return CacheIndex::default(),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read cache index, starting empty"
            );
            return CacheIndex::default();
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "corrupt cache index, starting empty"
            );
            CacheIndex::default()
        }
    }
}

fn validate_segment(segment: &str, object: &ObjectRef) -> Result<()> {
    let invalid = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ProxyError::InvalidKey(format!(
            "'{object}' cannot be mapped into the cache directory"
        )));
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("object");
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.part.{}.{n}", std::process::id()))
}

fn write_synced(path: &Path, reader: &mut dyn Read) -> io::Result<u64> {
    let mut file = File::create(path)?;
    let size = io::copy(reader, &mut file)?;
    file.flush()?;
    file.sync_all()?;
    Ok(size)
}
