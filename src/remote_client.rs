//! Remote directory client for the object-store HTTP API
//!
//! This module provides the [`ObjectDirectory`] abstraction over the remote
//! listing/download API and its HTTP implementation. The client holds no state
//! besides its connection pool: every call is one authenticated GET, with no
//! retries at this layer.

use std::fmt::{self, Debug};
use std::io::Read;

use reqwest::blocking::Client;

use crate::config::ProxyConfig;
use crate::listing::{normalize_buckets, normalize_objects};
use crate::types::{ObjectDescriptor, ObjectRef};
use crate::{ProxyError, Result};

/// Streaming body of a downloaded object
pub struct ObjectBody {
    /// URL the bytes were requested from, recorded in the cache index
    pub source_url: String,
    pub reader: Box<dyn Read + Send>,
}

impl Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody")
            .field("source_url", &self.source_url)
            .field("reader", &"<stream>")
            .finish()
    }
}

/// Trait for listing and downloading remote objects
///
/// A listing error means the remote state is unknown, not that it is empty:
/// callers must not try anything further with the affected bucket.
pub trait ObjectDirectory: Send + Sync + Debug {
    /// Names of all buckets
    fn list_buckets(&self) -> Result<Vec<String>>;

    /// Normalized listing of one bucket, in the order the remote returned it
    fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectDescriptor>>;

    /// Open a download of one object
    fn open_object(&self, object: &ObjectRef) -> Result<ObjectBody>;
}

/// Object directory backed by the REST API with HTTP basic authentication
pub struct HttpDirectory {
    endpoint: String,
    access_key: String,
    secret_key: String,
    client: Client,
}

impl Debug for HttpDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDirectory")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

impl HttpDirectory {
    /// Create a client from the proxy configuration
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn buckets_url(&self) -> String {
        format!("{}/buckets", self.endpoint)
    }

    fn objects_url(&self, bucket: &str) -> String {
        format!("{}/buckets/{}/objects", self.endpoint, urlencoding::encode(bucket))
    }

    /// URL of one object; `/` in the key is kept as a path separator
    pub fn object_url(&self, object: &ObjectRef) -> String {
        let key = object
            .key()
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.objects_url(object.bucket()), key)
    }

    fn get_listing(&self, url: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.access_key, Some(&self.secret_key))
            .send()
            .map_err(|e| {
                tracing::error!(url, error = %e, "listing request failed");
                ProxyError::Listing(format!("request to {url} failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(url, status = status.as_u16(), "listing request rejected");
            return Err(ProxyError::Listing(format!(
                "{url} returned HTTP {}",
                status.as_u16()
            )));
        }

        response
            .json::<serde_json::Value>()
            .map_err(|e| ProxyError::Listing(format!("{url} returned malformed JSON: {e}")))
    }
}

impl ObjectDirectory for HttpDirectory {
    fn list_buckets(&self) -> Result<Vec<String>> {
        let body = self.get_listing(&self.buckets_url())?;
        normalize_buckets(&body)
    }

    fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectDescriptor>> {
        let body = self.get_listing(&self.objects_url(bucket))?;
        let objects = normalize_objects(&body)?;
        tracing::info!(bucket, count = objects.len(), "listed bucket objects");
        Ok(objects)
    }

    fn open_object(&self, object: &ObjectRef) -> Result<ObjectBody> {
        let url = self.object_url(object);
        let download_error = |reason: String| ProxyError::Download {
            bucket: object.bucket().to_string(),
            key: object.key().to_string(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.access_key, Some(&self.secret_key))
            .send()
            .map_err(|e| download_error(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_error(format!(
                "{url} returned HTTP {}",
                status.as_u16()
            )));
        }

        Ok(ObjectBody {
            source_url: url,
            reader: Box::new(response),
        })
    }
}
