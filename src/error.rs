//! Error types for the object-store proxy

use thiserror::Error;

/// A remote URI literal that could not be substituted with a local path.
///
/// Warnings never fail the surrounding query on their own; what happens to the
/// query is decided by [`crate::config::UnresolvedUriPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteWarning {
    /// The literal URI as it appeared between the quotes
    pub uri: String,
    /// Human-readable reason the resolution failed
    pub reason: String,
}

impl RewriteWarning {
    pub fn new(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for RewriteWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "could not resolve '{}': {}", self.uri, self.reason)
    }
}

/// Error type for proxy operations
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Remote listing unavailable or malformed
    #[error("Listing error: {0}")]
    Listing(String),

    /// Wildcard resolved to zero candidates
    #[error("No object in bucket '{bucket}' matches '{pattern}'")]
    NoMatch { bucket: String, pattern: String },

    /// Object fetch failed after the heuristic retry
    #[error("Download of {bucket}/{key} failed: {reason}")]
    Download {
        bucket: String,
        key: String,
        reason: String,
    },

    /// The query engine rejected a view statement
    #[error("View '{view}' could not be created: {reason}")]
    ViewCreation { view: String, reason: String },

    /// URI literals left unresolved while the reject policy is active
    #[error("{} URI literal(s) could not be resolved: {}", .0.len(), format_warnings(.0))]
    UnresolvedUri(Vec<RewriteWarning>),

    /// Malformed or unsupported remote URI
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Bucket or key that cannot be mapped into the cache directory
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Catalog document or entry that matches no known shape
    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    /// Invalid proxy configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML decoding error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// DuckDB error
    #[cfg(feature = "engine-duckdb")]
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Generic error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_warnings(warnings: &[RewriteWarning]) -> String {
    warnings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
