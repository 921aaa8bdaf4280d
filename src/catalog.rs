//! Declarative table catalog
//!
//! A catalog maps table names to [`CatalogEntry`] definitions. The document is
//! a YAML or JSON mapping:
//!
//! ```yaml
//! test_connection:
//!   type: dummy
//! sales:
//!   bucket: sales
//!   prefix: csv/2024/
//!   format: csv
//! recent_sales:
//!   query: SELECT * FROM 'http://localhost:8001/buckets/sales/objects/*.csv'
//! ```

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};

use crate::types::RawFormat;
use crate::{ProxyError, Result};

/// Definition of one catalog table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEntry {
    /// Three constant rows, used to check connectivity
    Dummy,
    /// First object under `prefix` in `bucket` with the format's extension
    RawTable {
        bucket: String,
        prefix: String,
        format: RawFormat,
    },
    /// SQL whose remote URI literals are rewritten before the view is created
    QueryView { template: String },
}

impl CatalogEntry {
    pub fn raw_table(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        format: RawFormat,
    ) -> Self {
        Self::RawTable {
            bucket: bucket.into(),
            prefix: prefix.into(),
            format,
        }
    }

    pub fn query_view(template: impl Into<String>) -> Self {
        Self::QueryView {
            template: template.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dummy => "dummy",
            Self::RawTable { .. } => "table",
            Self::QueryView { .. } => "view",
        }
    }

    fn from_value(name: &str, value: &Value) -> Result<Self> {
        let invalid =
            |reason: &str| ProxyError::InvalidCatalog(format!("entry '{name}': {reason}"));
        let fields = value
            .as_object()
            .ok_or_else(|| invalid("definition must be a mapping"))?;
        let kind = optional_str(fields, "type").map_err(|e| invalid(&e))?;

        match kind.map(str::to_lowercase).as_deref() {
            Some("dummy") => return Ok(Self::Dummy),
            Some("view") | Some("table") | None => {}
            Some(other) => return Err(invalid(&format!("unknown type '{other}'"))),
        }

        if let Some(query) = optional_str(fields, "query").map_err(|e| invalid(&e))? {
            if kind.is_some_and(|k| k.eq_ignore_ascii_case("table")) {
                return Err(invalid("a table entry cannot carry a query"));
            }
            return Ok(Self::query_view(query));
        }

        if let Some(bucket) = optional_str(fields, "bucket").map_err(|e| invalid(&e))? {
            if bucket.is_empty() {
                return Err(invalid("bucket cannot be empty"));
            }
            let prefix = optional_str(fields, "prefix").map_err(|e| invalid(&e))?;
            let format = match optional_str(fields, "format").map_err(|e| invalid(&e))? {
                Some(format) => RawFormat::parse(format).map_err(|e| invalid(&e.to_string()))?,
                None => RawFormat::default(),
            };
            return Ok(Self::raw_table(bucket, prefix.unwrap_or_default(), format));
        }

        Err(invalid("expected 'type: dummy', a 'bucket' or a 'query'"))
    }
}

fn optional_str<'a>(
    fields: &'a Map<String, Value>,
    field: &str,
) -> std::result::Result<Option<&'a str>, String> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(format!("'{field}' must be a string")),
    }
}

/// Table name to definition, iterated in name order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(document: &str) -> Result<Self> {
        if document.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: Value = serde_yaml::from_str(document)?;
        Self::from_value(&value)
    }

    pub fn from_json_str(document: &str) -> Result<Self> {
        if document.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: Value = serde_json::from_str(document)?;
        Self::from_value(&value)
    }

    /// Load a catalog file; `.json` files are parsed as JSON, anything else as YAML
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let catalog = if is_json {
            Self::from_json_str(&document)?
        } else {
            Self::from_yaml_str(&document)?
        };
        tracing::debug!(
            path = %path.display(),
            tables = ?catalog.names().collect::<Vec<_>>(),
            "loaded catalog"
        );
        Ok(catalog)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => {
                let entries = map
                    .iter()
                    .map(|(name, definition)| {
                        Ok((name.clone(), CatalogEntry::from_value(name, definition)?))
                    })
                    .collect::<Result<_>>()?;
                Ok(Self { entries })
            }
            _ => Err(ProxyError::InvalidCatalog(
                "catalog document must be a mapping of table names".to_string(),
            )),
        }
    }

    pub fn with_entry(mut self, name: impl Into<String>, entry: CatalogEntry) -> Self {
        self.insert(name, entry);
        self
    }

    /// Add or replace an entry, returning the previous definition
    pub fn insert(&mut self, name: impl Into<String>, entry: CatalogEntry) -> Option<CatalogEntry> {
        self.entries.insert(name.into(), entry)
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, CatalogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = (&'a String, &'a CatalogEntry);
    type IntoIter = btree_map::Iter<'a, String, CatalogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(String, CatalogEntry)> for Catalog {
    fn from_iter<I: IntoIterator<Item = (String, CatalogEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
