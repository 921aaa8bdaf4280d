//! Cache-first object fetching
//!
//! Concurrent misses on the same object are coalesced: the first caller takes
//! the per-object lock and downloads, the others wait on the lock and then find
//! the fresh cache entry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache_store::CacheStore;
use crate::remote_client::ObjectDirectory;
use crate::types::ObjectRef;
use crate::{ProxyError, Result};

/// Key folders that name a file format rather than a real directory
pub const FORMAT_FOLDERS: [&str; 2] = ["csv", "parquet"];

#[derive(Debug)]
pub struct Downloader {
    directory: Arc<dyn ObjectDirectory>,
    store: Arc<CacheStore>,
    in_flight: Mutex<HashMap<ObjectRef, Arc<Mutex<()>>>>,
}

impl Downloader {
    pub fn new(directory: Arc<dyn ObjectDirectory>, store: Arc<CacheStore>) -> Self {
        Self {
            directory,
            store,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Local path of `object`, downloading it on a cache miss
    ///
    /// A failed download whose key starts with a format folder (`csv/data.csv`)
    /// is retried once as the bare file name (`data.csv`).
    pub fn fetch(&self, object: &ObjectRef) -> Result<PathBuf> {
        if object.has_wildcard() {
            return Err(ProxyError::Download {
                bucket: object.bucket().to_string(),
                key: object.key().to_string(),
                reason: "wildcard keys must be resolved before fetching".to_string(),
            });
        }

        let first = match self.fetch_once(object) {
            Ok(path) => return Ok(path),
            Err(e @ ProxyError::InvalidKey(_)) => return Err(e),
            Err(e) => e,
        };

        let Some(fallback) = format_folder_fallback(object) else {
            return Err(as_download_error(object, first));
        };

        tracing::info!(
            object = %object,
            retry = %fallback,
            error = %first,
            "download failed, retrying without format folder"
        );
        self.fetch_once(&fallback).map_err(|second| ProxyError::Download {
            bucket: object.bucket().to_string(),
            key: object.key().to_string(),
            reason: format!("{first}; retry as '{}' failed: {second}", fallback.key()),
        })
    }

    fn fetch_once(&self, object: &ObjectRef) -> Result<PathBuf> {
        if let Some(path) = self.store.lookup(object)? {
            return Ok(path);
        }

        let slot = self.acquire(object);
        let _guard = slot.lock.lock();

        // another caller may have completed the download while we waited
        if let Some(path) = self.store.lookup(object)? {
            return Ok(path);
        }
        self.download(object)
    }

    fn download(&self, object: &ObjectRef) -> Result<PathBuf> {
        let mut body = self.directory.open_object(object).map_err(|e| {
            tracing::error!(object = %object, error = %e, "download failed");
            e
        })?;
        let path = self
            .store
            .put_reader(object, &mut body.reader, &body.source_url)?;
        tracing::info!(
            object = %object,
            source_url = %body.source_url,
            path = %path.display(),
            "downloaded object"
        );
        Ok(path)
    }

    fn acquire(&self, object: &ObjectRef) -> InFlightSlot<'_> {
        let lock = self
            .in_flight
            .lock()
            .entry(object.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        InFlightSlot {
            downloader: self,
            object: object.clone(),
            lock,
        }
    }

    /// Number of objects currently being downloaded or waited on
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}

/// Holds a handle on one in-flight lock; the map entry goes away with the last handle
struct InFlightSlot<'a> {
    downloader: &'a Downloader,
    object: ObjectRef,
    lock: Arc<Mutex<()>>,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        let mut map = self.downloader.in_flight.lock();
        // one reference held by the map, one by us
        if Arc::strong_count(&self.lock) == 2 {
            map.remove(&self.object);
        }
    }
}

fn format_folder_fallback(object: &ObjectRef) -> Option<ObjectRef> {
    let (folder, rest) = object.key().split_once('/')?;
    if rest.is_empty() || !FORMAT_FOLDERS.iter().any(|f| f.eq_ignore_ascii_case(folder)) {
        return None;
    }
    Some(ObjectRef::new(object.bucket(), object.file_name()))
}

fn as_download_error(object: &ObjectRef, error: ProxyError) -> ProxyError {
    match error {
        e @ ProxyError::Download { .. } => e,
        other => ProxyError::Download {
            bucket: object.bucket().to_string(),
            key: object.key().to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::remote_client::ObjectBody;
    use crate::types::ObjectDescriptor;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct MapDirectory {
        objects: BTreeMap<ObjectRef, Vec<u8>>,
        opens: AtomicUsize,
    }

    impl MapDirectory {
        fn with(mut self, bucket: &str, key: &str, body: &[u8]) -> Self {
            self.objects.insert(ObjectRef::new(bucket, key), body.to_vec());
            self
        }
    }

    impl ObjectDirectory for MapDirectory {
        fn list_buckets(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }

        fn list_objects(&self, _bucket: &str) -> Result<Vec<ObjectDescriptor>> {
            Ok(vec![])
        }

        fn open_object(&self, object: &ObjectRef) -> Result<ObjectBody> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            match self.objects.get(object) {
                Some(body) => Ok(ObjectBody {
                    source_url: format!("mem://{object}"),
                    reader: Box::new(std::io::Cursor::new(body.clone())),
                }),
                None => Err(ProxyError::Download {
                    bucket: object.bucket().to_string(),
                    key: object.key().to_string(),
                    reason: "HTTP 404".to_string(),
                }),
            }
        }
    }

    fn downloader(
        dir: &std::path::Path,
        directory: MapDirectory,
    ) -> (Downloader, Arc<MapDirectory>) {
        let directory = Arc::new(directory);
        let store = CacheStore::open(
            dir,
            Duration::from_secs(3600),
            Arc::new(ManualClock::new(1_700_000_000.0)),
        )
        .unwrap();
        (
            Downloader::new(directory.clone(), Arc::new(store)),
            directory,
        )
    }

    #[test]
    fn test_fetch_downloads_once_then_hits_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let (downloader, remote) =
            downloader(tmp.path(), MapDirectory::default().with("b", "k.csv", b"a\n1\n"));
        let object = ObjectRef::new("b", "k.csv");

        let first = downloader.fetch(&object).unwrap();
        let second = downloader.fetch(&object).unwrap();
        assert_eq!(first, second);
        assert_eq!(b"a\n1\n".to_vec(), std::fs::read(&first).unwrap());
        assert_eq!(1, remote.opens.load(Ordering::SeqCst));
        assert_eq!(0, downloader.in_flight_count());
    }

    #[test]
    fn test_fetch_rejects_wildcards() {
        let tmp = tempfile::tempdir().unwrap();
        let (downloader, remote) = downloader(tmp.path(), MapDirectory::default());
        let result = downloader.fetch(&ObjectRef::new("b", "*.csv"));
        assert!(matches!(result, Err(ProxyError::Download { .. })));
        assert_eq!(0, remote.opens.load(Ordering::SeqCst));
    }

    #[test]
    fn test_format_folder_retry() {
        let tmp = tempfile::tempdir().unwrap();
        let (downloader, remote) =
            downloader(tmp.path(), MapDirectory::default().with("b", "data.csv", b"x"));

        let path = downloader.fetch(&ObjectRef::new("b", "csv/data.csv")).unwrap();
        assert!(path.ends_with("data.csv"));
        assert_eq!(2, remote.opens.load(Ordering::SeqCst));
        assert!(downloader
            .store()
            .entry(&ObjectRef::new("b", "data.csv"))
            .is_some());
    }

    #[test]
    fn test_no_retry_outside_format_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let (downloader, remote) =
            downloader(tmp.path(), MapDirectory::default().with("b", "data.csv", b"x"));

        match downloader.fetch(&ObjectRef::new("b", "reports/data.csv")) {
            Err(ProxyError::Download { key, .. }) => assert_eq!("reports/data.csv", key),
            other => panic!("Expected Download error, got {:?}", other),
        }
        assert_eq!(1, remote.opens.load(Ordering::SeqCst));
    }

    #[test]
    fn test_retry_failure_reports_both_attempts() {
        let tmp = tempfile::tempdir().unwrap();
        let (downloader, remote) = downloader(tmp.path(), MapDirectory::default());

        match downloader.fetch(&ObjectRef::new("b", "parquet/missing.parquet")) {
            Err(ProxyError::Download { key, reason, .. }) => {
                assert_eq!("parquet/missing.parquet", key);
                assert!(reason.contains("missing.parquet"), "{reason}");
            }
            other => panic!("Expected Download error, got {:?}", other),
        }
        assert_eq!(2, remote.opens.load(Ordering::SeqCst));
    }

    #[test]
    fn test_fallback_only_for_nested_keys() {
        assert_eq!(
            Some(ObjectRef::new("b", "x.csv")),
            format_folder_fallback(&ObjectRef::new("b", "CSV/x.csv"))
        );
        assert_eq!(
            Some(ObjectRef::new("b", "y.parquet")),
            format_folder_fallback(&ObjectRef::new("b", "parquet/2024/y.parquet"))
        );
        assert_eq!(None, format_folder_fallback(&ObjectRef::new("b", "csv")));
        assert_eq!(None, format_folder_fallback(&ObjectRef::new("b", "csv/")));
        assert_eq!(None, format_folder_fallback(&ObjectRef::new("b", "json/x.json")));
    }
}
