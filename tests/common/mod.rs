//! Common test utilities for integration tests
//!
//! [`FakeDirectory`] stands in for the remote object store and counts every
//! call made against it. [`LoopbackServer`] serves canned HTTP responses on
//! 127.0.0.1 for tests that exercise the real HTTP client.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use duckdb_object_proxy::{
    CacheManager, ManualClock, ObjectBody, ObjectDescriptor, ObjectDirectory, ObjectRef,
    ProxyConfig, ProxyError,
};
use parking_lot::Mutex;
use tiny_http::{Header, Method, Response, Server, StatusCode};

/// Fixed start time for manual clocks, in epoch seconds
pub const START_SECS: f64 = 1_700_000_000.0;

/// In-memory object directory
///
/// Listings preserve insertion order, like a remote that returns objects in
/// upload order.
#[derive(Debug, Default)]
pub struct FakeDirectory {
    buckets: Mutex<BTreeMap<String, Vec<(String, Vec<u8>)>>>,
    failing_listings: Mutex<HashSet<String>>,
    opens_per_object: Mutex<HashMap<ObjectRef, usize>>,
    open_delay: Mutex<Option<Duration>>,
    list_calls: AtomicUsize,
    open_calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, bucket: &str, key: &str, body: &[u8]) -> Self {
        self.put_object(bucket, key, body);
        self
    }

    pub fn with_bucket(self, bucket: &str) -> Self {
        self.buckets.lock().entry(bucket.to_string()).or_default();
        self
    }

    /// Add or replace an object
    pub fn put_object(&self, bucket: &str, key: &str, body: &[u8]) {
        let mut buckets = self.buckets.lock();
        let objects = buckets.entry(bucket.to_string()).or_default();
        match objects.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = body.to_vec(),
            None => objects.push((key.to_string(), body.to_vec())),
        }
    }

    pub fn remove_object(&self, bucket: &str, key: &str) {
        if let Some(objects) = self.buckets.lock().get_mut(bucket) {
            objects.retain(|(k, _)| k != key);
        }
    }

    /// Make listings of `bucket` fail as if the remote were unavailable
    pub fn fail_listing(&self, bucket: &str) {
        self.failing_listings.lock().insert(bucket.to_string());
    }

    /// Sleep this long inside every download, to widen race windows
    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock() = Some(delay);
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn opens_of(&self, bucket: &str, key: &str) -> usize {
        self.opens_per_object
            .lock()
            .get(&ObjectRef::new(bucket, key))
            .copied()
            .unwrap_or(0)
    }
}

impl ObjectDirectory for FakeDirectory {
    fn list_buckets(&self) -> duckdb_object_proxy::Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.buckets.lock().keys().cloned().collect())
    }

    fn list_objects(&self, bucket: &str) -> duckdb_object_proxy::Result<Vec<ObjectDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_listings.lock().contains(bucket) {
            return Err(ProxyError::Listing(format!("{bucket}: HTTP 503")));
        }
        match self.buckets.lock().get(bucket) {
            Some(objects) => Ok(objects
                .iter()
                .map(|(key, body)| ObjectDescriptor::new(key.clone()).with_size(body.len() as u64))
                .collect()),
            None => Err(ProxyError::Listing(format!("{bucket}: HTTP 404"))),
        }
    }

    fn open_object(&self, object: &ObjectRef) -> duckdb_object_proxy::Result<ObjectBody> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        *self.opens_per_object.lock().entry(object.clone()).or_default() += 1;

        let delay = *self.open_delay.lock();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        let body = self
            .buckets
            .lock()
            .get(object.bucket())
            .and_then(|objects| objects.iter().find(|(k, _)| k == object.key()))
            .map(|(_, body)| body.clone());
        match body {
            Some(body) => Ok(ObjectBody {
                source_url: format!("fake://{object}"),
                reader: Box::new(Cursor::new(body)),
            }),
            None => Err(ProxyError::Download {
                bucket: object.bucket().to_string(),
                key: object.key().to_string(),
                reason: "HTTP 404".to_string(),
            }),
        }
    }
}

/// Manager over `directory` with a cache in `cache_dir` and a one hour TTL
pub fn manager_with(
    cache_dir: &Path,
    directory: Arc<FakeDirectory>,
    clock: &ManualClock,
) -> Result<CacheManager> {
    manager_with_config(ProxyConfig::default().with_cache_dir(cache_dir), directory, clock)
}

pub fn manager_with_config(
    config: ProxyConfig,
    directory: Arc<FakeDirectory>,
    clock: &ManualClock,
) -> Result<CacheManager> {
    Ok(CacheManager::with_directory(
        config,
        directory,
        Arc::new(clock.clone()),
    )?)
}

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One canned response
#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Route {
    pub fn json(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn bytes(body: &[u8]) -> Self {
        Self {
            status: 200,
            content_type: "application/octet-stream",
            body: body.to_vec(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: b"error".to_vec(),
        }
    }
}

/// A request as seen by the loopback server
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub path: String,
    pub authorization: Option<String>,
}

/// HTTP server on an ephemeral local port answering from a fixed route table
///
/// Unknown paths get a 404.
pub struct LoopbackServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<SeenRequest>>>,
}

impl LoopbackServer {
    pub fn start(routes: HashMap<String, Route>) -> Result<Self> {
        let server = Server::http("127.0.0.1:0")
            .map_err(|e| anyhow::anyhow!("loopback server failed to bind: {e}"))?;
        let addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| anyhow::anyhow!("loopback server has no IP address"))?;
        let base_url = format!("http://{addr}");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        thread::spawn(move || {
            for request in server.incoming_requests() {
                let path = request.url().to_string();
                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.as_str().to_string());
                seen.lock().push(SeenRequest {
                    path: path.clone(),
                    authorization,
                });

                let route = match (request.method(), routes.get(&path)) {
                    (Method::Get, Some(route)) => route.clone(),
                    (Method::Get, None) => Route::status(404),
                    _ => Route::status(405),
                };
                let content_type = Header::from_bytes("Content-Type", route.content_type)
                    .expect("content type header");
                let response = Response::from_data(route.body)
                    .with_status_code(StatusCode(route.status))
                    .with_header(content_type);
                if let Err(e) = request.respond(response) {
                    eprintln!("loopback server: {e}");
                }
            }
        });

        Ok(Self { base_url, requests })
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().clone()
    }
}
