//! Core value types shared by the directory client, cache and materializer

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ProxyError, Result};

/// Identifies one remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    bucket: String,
    key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the key still contains glob characters
    pub fn has_wildcard(&self) -> bool {
        self.key.contains('*')
    }

    /// Last `/`-separated segment of the key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// One entry of a normalized object listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDescriptor {
    /// Object name (copied from `key` when the listing has no `name`)
    pub name: String,
    /// Size in bytes, when the listing reports one
    pub size: Option<u64>,
    /// The listing entry as it was received
    pub raw: serde_json::Value,
}

impl ObjectDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let raw = serde_json::Value::String(name.clone());
        Self {
            name,
            size: None,
            raw,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// File format of a raw table entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RawFormat {
    #[default]
    Parquet,
    Csv,
    Json,
}

impl RawFormat {
    /// Parse a format name (case-insensitive)
    pub fn parse(format: &str) -> Result<Self> {
        match format.trim().to_lowercase().as_str() {
            "parquet" => Ok(Self::Parquet),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(ProxyError::InvalidCatalog(format!(
                "unsupported format '{other}' (expected parquet, csv or json)"
            ))),
        }
    }

    /// File extension (without the dot) that objects of this format carry
    pub fn extension(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// DuckDB table function that reads a local file of this format
    pub fn reader_function(self) -> &'static str {
        match self {
            Self::Parquet => "read_parquet",
            Self::Csv => "read_csv_auto",
            Self::Json => "read_json_auto",
        }
    }
}

impl fmt::Display for RawFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
