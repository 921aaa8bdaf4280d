//! Entry point bundling the directory client, cache store and downloader
//!
//! A [`CacheManager`] is constructed once by the hosting process and shared
//! (behind an `Arc`) with every component that needs remote objects.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache_store::CacheStore;
use crate::catalog::{Catalog, CatalogEntry};
use crate::clock::{Clock, SystemClock};
use crate::config::{ProxyConfig, UnresolvedUriPolicy};
use crate::downloader::Downloader;
use crate::error::RewriteWarning;
use crate::path_resolver::parse_remote_uri;
use crate::remote_client::{HttpDirectory, ObjectDirectory};
use crate::rewriter::{rewrite_query, RewriteOutcome};
use crate::types::{ObjectDescriptor, ObjectRef};
use crate::wildcard::{self, WildcardPattern};
use crate::{ProxyError, Result};

#[derive(Debug)]
pub struct CacheManager {
    config: ProxyConfig,
    directory: Arc<dyn ObjectDirectory>,
    store: Arc<CacheStore>,
    downloader: Downloader,
}

impl CacheManager {
    /// Manager talking to the HTTP API named by `config`
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let directory = Arc::new(HttpDirectory::new(&config)?);
        Self::with_directory(config, directory, Arc::new(SystemClock))
    }

    /// Manager over any directory implementation and time source
    ///
    /// Entries that expired while the process was down are swept before the
    /// manager is returned.
    pub fn with_directory(
        config: ProxyConfig,
        directory: Arc<dyn ObjectDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(CacheStore::open(&config.cache_dir, config.cache_ttl, clock)?);
        if let Err(e) = store.sweep_expired() {
            tracing::warn!(error = %e, "initial cache sweep failed");
        }
        let downloader = Downloader::new(directory.clone(), store.clone());
        Ok(Self {
            config,
            directory,
            store,
            downloader,
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn directory(&self) -> &Arc<dyn ObjectDirectory> {
        &self.directory
    }

    pub fn list_buckets(&self) -> Result<Vec<String>> {
        self.directory.list_buckets()
    }

    pub fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectDescriptor>> {
        self.directory.list_objects(bucket)
    }

    /// Concrete object for `object`, resolving a wildcard key against a fresh listing
    pub fn resolve_object(&self, object: &ObjectRef) -> Result<ObjectRef> {
        if !object.has_wildcard() {
            return Ok(object.clone());
        }
        let listing = self.directory.list_objects(object.bucket())?;
        wildcard::resolve(object.bucket(), object.key(), &listing)
    }

    /// Resolve a raw-table pattern: first object under `prefix` with extension `ext`
    pub fn resolve_pattern(&self, bucket: &str, pattern: &WildcardPattern) -> Result<ObjectRef> {
        let listing = self.directory.list_objects(bucket)?;
        let shown = match &pattern.extension {
            Some(ext) => format!("{}*.{}", pattern.prefix, ext),
            None => format!("{}*", pattern.prefix),
        };
        wildcard::resolve_pattern(bucket, pattern, &shown, &listing)
    }

    /// Local path of `object`, resolving wildcards and downloading on a miss
    ///
    /// With a configured sweep interval, an overdue sweep runs after the fetch.
    pub fn fetch(&self, object: &ObjectRef) -> Result<PathBuf> {
        let concrete = self.resolve_object(object)?;
        let path = self.downloader.fetch(&concrete)?;
        self.sweep_if_due();
        Ok(path)
    }

    fn sweep_if_due(&self) {
        let Some(interval) = self.config.sweep_interval else {
            return;
        };
        if let Err(e) = self.store.sweep_if_due(interval) {
            tracing::warn!(error = %e, "periodic cache sweep failed");
        }
    }

    /// Local path of the object a remote URI literal names
    pub fn resolve_uri(&self, uri: &str) -> Result<PathBuf> {
        let object = parse_remote_uri(uri)?;
        self.fetch(&object)
    }

    /// Rewrite every remote literal in `query`, leaving unresolved ones in place
    pub fn rewrite(&self, query: &str) -> RewriteOutcome {
        let outcome = rewrite_query(query, |uri| self.resolve_uri(uri));
        if !outcome.is_complete() {
            tracing::warn!(
                unresolved = outcome.warnings.len(),
                "query rewritten with unresolved remote literals"
            );
        }
        outcome
    }

    /// Rewrite `query` and apply the configured [`UnresolvedUriPolicy`]
    pub fn rewrite_strict(&self, query: &str) -> Result<RewriteOutcome> {
        self.apply_policy(self.rewrite(query))
    }

    /// Fail an incomplete rewrite when the policy is [`UnresolvedUriPolicy::Reject`]
    pub fn apply_policy(&self, outcome: RewriteOutcome) -> Result<RewriteOutcome> {
        match self.config.unresolved_uri_policy {
            UnresolvedUriPolicy::Reject if !outcome.is_complete() => {
                Err(ProxyError::UnresolvedUri(outcome.warnings))
            }
            _ => Ok(outcome),
        }
    }

    /// Copy of `catalog` with every query view already rewritten to local paths
    ///
    /// Fetches every referenced object as a side effect. Only query views change.
    pub fn rewrite_catalog(&self, catalog: &Catalog) -> (Catalog, Vec<RewriteWarning>) {
        let mut warnings = Vec::new();
        let rewritten = catalog
            .iter()
            .map(|(name, entry)| {
                let entry = match entry {
                    CatalogEntry::QueryView { template } => {
                        let outcome = self.rewrite(template);
                        warnings.extend(outcome.warnings);
                        CatalogEntry::query_view(outcome.query)
                    }
                    other => other.clone(),
                };
                (name.clone(), entry)
            })
            .collect();
        (rewritten, warnings)
    }

    /// Evict entries older than the configured TTL
    pub fn sweep(&self) -> Result<usize> {
        self.store.sweep_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::remote_client::ObjectBody;
    use std::time::Duration;

    #[derive(Debug)]
    struct OneBucket;

    impl ObjectDirectory for OneBucket {
        fn list_buckets(&self) -> Result<Vec<String>> {
            Ok(vec!["b".to_string()])
        }

        fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectDescriptor>> {
            match bucket {
                "b" => Ok(vec![
                    ObjectDescriptor::new("notes.txt"),
                    ObjectDescriptor::new("data.csv"),
                ]),
                other => Err(ProxyError::Listing(format!("no bucket {other}"))),
            }
        }

        fn open_object(&self, object: &ObjectRef) -> Result<ObjectBody> {
            if object.bucket() != "b" {
                return Err(ProxyError::Download {
                    bucket: object.bucket().to_string(),
                    key: object.key().to_string(),
                    reason: "no such bucket".to_string(),
                });
            }
            Ok(ObjectBody {
                source_url: format!("mem://{object}"),
                reader: Box::new(std::io::Cursor::new(object.key().as_bytes().to_vec())),
            })
        }
    }

    fn manager(dir: &std::path::Path, policy: UnresolvedUriPolicy) -> CacheManager {
        let config = ProxyConfig::default()
            .with_cache_dir(dir)
            .with_unresolved_uri_policy(policy);
        CacheManager::with_directory(
            config,
            Arc::new(OneBucket),
            Arc::new(ManualClock::new(1_700_000_000.0)),
        )
        .unwrap()
    }

    #[test]
    fn test_fetch_resolves_wildcards() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), UnresolvedUriPolicy::LeaveInPlace);
        let path = manager.fetch(&ObjectRef::new("b", "*.csv")).unwrap();
        assert_eq!(b"data.csv".to_vec(), std::fs::read(path).unwrap());
    }

    #[test]
    fn test_rewrite_substitutes_cached_path() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), UnresolvedUriPolicy::LeaveInPlace);
        let outcome = manager.rewrite("SELECT * FROM 'http://h/buckets/b/objects/*.csv'");
        let expected = dir.path().join("b").join("data.csv");
        assert_eq!(
            format!("SELECT * FROM '{}'", expected.display()),
            outcome.query
        );
    }

    #[test]
    fn test_policy_decides_unresolved_literals() {
        let dir = tempfile::tempdir().unwrap();
        let query = "SELECT * FROM 'http://h/buckets/missing/objects/*.csv'";

        let lenient = manager(dir.path(), UnresolvedUriPolicy::LeaveInPlace);
        let outcome = lenient.rewrite_strict(query).unwrap();
        assert_eq!(query, outcome.query);
        assert_eq!(1, outcome.warnings.len());

        let strict = manager(dir.path(), UnresolvedUriPolicy::Reject);
        match strict.rewrite_strict(query) {
            Err(ProxyError::UnresolvedUri(warnings)) => {
                assert_eq!("http://h/buckets/missing/objects/*.csv", warnings[0].uri)
            }
            other => panic!("Expected UnresolvedUri, got {:?}", other),
        }
    }

    #[test]
    fn test_rewrite_catalog_only_touches_views() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), UnresolvedUriPolicy::LeaveInPlace);
        let catalog = Catalog::new()
            .with_entry("d", CatalogEntry::Dummy)
            .with_entry("v", CatalogEntry::query_view("SELECT * FROM 's3://b/data.csv'"))
            .with_entry("bad", CatalogEntry::query_view("SELECT * FROM 's3://zzz/x.csv'"));

        let (rewritten, warnings) = manager.rewrite_catalog(&catalog);
        assert_eq!(Some(&CatalogEntry::Dummy), rewritten.get("d"));
        match rewritten.get("v") {
            Some(CatalogEntry::QueryView { template }) => assert!(!template.contains("s3://")),
            other => panic!("Expected rewritten view, got {:?}", other),
        }
        assert_eq!(catalog.get("bad"), rewritten.get("bad"));
        assert_eq!(1, warnings.len());
        assert_eq!("s3://zzz/x.csv", warnings[0].uri);
        assert!(!dir.path().join("zzz").exists());
    }

    #[test]
    fn test_fetch_runs_overdue_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(1_700_000_000.0);
        let config = ProxyConfig::default()
            .with_cache_dir(dir.path())
            .with_cache_ttl(Duration::from_secs(60))
            .with_sweep_interval(Duration::from_secs(30));
        let manager =
            CacheManager::with_directory(config, Arc::new(OneBucket), Arc::new(clock.clone()))
                .unwrap();

        let stale = manager.fetch(&ObjectRef::new("b", "notes.txt")).unwrap();
        clock.advance(Duration::from_secs(120));
        manager.fetch(&ObjectRef::new("b", "data.csv")).unwrap();

        assert!(!stale.exists());
        assert_eq!(1, manager.store().len());
    }

    #[test]
    fn test_construction_sweeps_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(1_700_000_000.0);
        let config = ProxyConfig::default()
            .with_cache_dir(dir.path())
            .with_cache_ttl(Duration::from_secs(60));
        {
            let manager = CacheManager::with_directory(
                config.clone(),
                Arc::new(OneBucket),
                Arc::new(clock.clone()),
            )
            .unwrap();
            manager.fetch(&ObjectRef::new("b", "data.csv")).unwrap();
        }

        clock.advance(Duration::from_secs(120));
        let manager =
            CacheManager::with_directory(config, Arc::new(OneBucket), Arc::new(clock)).unwrap();
        assert!(manager.store().is_empty());
        assert!(!dir.path().join("b").join("data.csv").exists());
    }
}
