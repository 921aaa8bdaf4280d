//! Remote URI parsing
//!
//! Maps a literal remote URI, as it appears inside query text, onto the
//! [`ObjectRef`] it names. Two HTTP path shapes are understood:
//!
//! - REST: `http://host/buckets/<bucket>/objects/<key...>`
//! - legacy: `http://host/<bucket>/<key...>`
//!
//! plus `s3://<bucket>/<key...>`. Userinfo, port, query and fragment are ignored.

use url::Url;

use crate::types::ObjectRef;
use crate::{ProxyError, Result};

/// Parses a remote URI literal into the object it references
///
/// # Errors
/// Returns [`ProxyError::InvalidUri`] if:
/// - the text is not a URL or uses a scheme other than `http`, `https` or `s3`
/// - the bucket or key is empty
///
/// # Example
/// ```
/// # use duckdb_object_proxy::path_resolver::parse_remote_uri;
/// let object = parse_remote_uri("http://localhost:8001/buckets/sales/objects/csv/q1.csv")?;
/// assert_eq!("sales", object.bucket());
/// assert_eq!("csv/q1.csv", object.key());
/// # Ok::<(), duckdb_object_proxy::ProxyError>(())
/// ```
pub fn parse_remote_uri(uri: &str) -> Result<ObjectRef> {
    let url = Url::parse(uri)
        .map_err(|e| ProxyError::InvalidUri(format!("Failed to parse URI '{}': {}", uri, e)))?;

    let object = match url.scheme() {
        "http" | "https" => parse_http_path(uri, url.path())?,
        "s3" => parse_s3(uri, &url)?,
        other => {
            return Err(ProxyError::InvalidUri(format!(
                "Unsupported scheme '{}' in '{}'",
                other, uri
            )))
        }
    };

    if object.bucket().is_empty() || object.key().is_empty() {
        return Err(ProxyError::InvalidUri(format!(
            "URI '{}' must name both a bucket and a key",
            uri
        )));
    }
    Ok(object)
}

fn parse_http_path(uri: &str, path: &str) -> Result<ObjectRef> {
    let segments = path
        .trim_start_matches('/')
        .split('/')
        .map(|segment| decode(uri, segment))
        .collect::<Result<Vec<_>>>()?;

    let is_rest = segments.len() >= 4 && segments[0] == "buckets" && segments[2] == "objects";
    let (bucket, key) = if is_rest {
        (segments[1].clone(), segments[3..].join("/"))
    } else {
        match segments.split_first() {
            Some((bucket, rest)) => (bucket.clone(), rest.join("/")),
            None => (String::new(), String::new()),
        }
    };
    Ok(ObjectRef::new(bucket, key))
}

fn parse_s3(uri: &str, url: &Url) -> Result<ObjectRef> {
    let bucket = url.host_str().ok_or_else(|| {
        ProxyError::InvalidUri(format!("S3 URI missing bucket: {}", uri))
    })?;
    let key = url
        .path()
        .trim_start_matches('/')
        .split('/')
        .map(|segment| decode(uri, segment))
        .collect::<Result<Vec<_>>>()?
        .join("/");
    Ok(ObjectRef::new(decode(uri, bucket)?, key))
}

fn decode(uri: &str, segment: &str) -> Result<String> {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| {
            ProxyError::InvalidUri(format!("Invalid percent-encoding in '{}': {}", uri, e))
        })
}
