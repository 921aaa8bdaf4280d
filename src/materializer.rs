//! Materialization of a catalog into engine views
//!
//! Every catalog entry becomes one `CREATE OR REPLACE VIEW`. Entries are
//! independent: when one fails (listing, wildcard, download, engine) a
//! diagnostic view with the same name and an `error_message` column is created
//! in its place and the next entry is processed.

use crate::cache_manager::CacheManager;
use crate::catalog::{Catalog, CatalogEntry};
use crate::engine::QueryEngine;
use crate::error::RewriteWarning;
use crate::types::RawFormat;
use crate::wildcard::WildcardPattern;
use crate::{ProxyError, Result};

/// Maximum length for table names
pub const MAX_NAME_LENGTH: usize = 1024;

const DUMMY_ROWS: &str = "(1, 'test1', 100), (2, 'test2', 200), (3, 'test3', 300)";

/// Validates a table name before it is used as a view identifier.
///
/// Names must not:
/// - Be empty or whitespace-only
/// - Contain control characters (ASCII 0x00-0x1F, 0x7F)
/// - Exceed [`MAX_NAME_LENGTH`] characters
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ProxyError::InvalidCatalog(
            "table name cannot be empty or whitespace-only".to_string(),
        ));
    }
    if let Some(pos) = name.find(|c: char| c.is_ascii_control()) {
        let byte = name.as_bytes()[pos];
        return Err(ProxyError::InvalidCatalog(format!(
            "table name contains control character 0x{byte:02X} at position {pos}"
        )));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(ProxyError::InvalidCatalog(format!(
            "table name exceeds maximum length of {MAX_NAME_LENGTH} characters (got {})",
            name.len()
        )));
    }
    Ok(())
}

/// Double-quoted SQL identifier
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quoted SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn dummy_view_sql(name: &str) -> String {
    format!(
        "CREATE OR REPLACE VIEW {} AS SELECT * FROM (VALUES {DUMMY_ROWS}) AS t(id, name, value)",
        quote_identifier(name)
    )
}

pub fn raw_table_view_sql(name: &str, format: RawFormat, path: &str) -> String {
    format!(
        "CREATE OR REPLACE VIEW {} AS SELECT * FROM {}({})",
        quote_identifier(name),
        format.reader_function(),
        quote_literal(path)
    )
}

/// View over a single query; trailing `;` are dropped, any other separator is refused
pub fn query_view_sql(name: &str, query: &str) -> Result<String> {
    let body = query.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if let Some(pos) = statement_separator(body) {
        return Err(ProxyError::InvalidCatalog(format!(
            "query for view '{name}' holds more than one statement (';' at byte {pos})"
        )));
    }
    Ok(format!(
        "CREATE OR REPLACE VIEW {} AS {}",
        quote_identifier(name),
        body
    ))
}

/// Byte offset of the first `;` outside quotes and comments
fn statement_separator(sql: &str) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b';' => return Some(i),
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Zero-row view whose definition carries the failure message
pub fn fallback_view_sql(name: &str, diagnostic: &str) -> String {
    format!(
        "CREATE OR REPLACE VIEW {} AS SELECT {} AS error_message WHERE 1 = 0",
        quote_identifier(name),
        quote_literal(diagnostic)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    /// The view was created from `sql`
    Materialized { sql: String },
    /// The entry failed; a diagnostic view was created if `fallback_created`
    Degraded {
        reason: String,
        fallback_created: bool,
    },
}

/// What happened to one catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOutcome {
    pub name: String,
    pub status: EntryStatus,
    /// Remote literals of a query view that were left unresolved
    pub warnings: Vec<RewriteWarning>,
}

impl EntryOutcome {
    pub fn is_materialized(&self) -> bool {
        matches!(self.status, EntryStatus::Materialized { .. })
    }
}

/// Per-entry outcomes in catalog order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    pub entries: Vec<EntryOutcome>,
}

impl MaterializeReport {
    pub fn get(&self, name: &str) -> Option<&EntryOutcome> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn materialized_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_materialized()).count()
    }

    pub fn degraded_count(&self) -> usize {
        self.entries.len() - self.materialized_count()
    }

    /// No entry degraded and no literal left unresolved
    pub fn is_clean(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.is_materialized() && e.warnings.is_empty())
    }
}

pub struct CatalogMaterializer<'a> {
    manager: &'a CacheManager,
    engine: &'a dyn QueryEngine,
}

impl<'a> CatalogMaterializer<'a> {
    pub fn new(manager: &'a CacheManager, engine: &'a dyn QueryEngine) -> Self {
        Self { manager, engine }
    }

    /// Create one view per catalog entry; never fails as a whole
    pub fn materialize(&self, catalog: &Catalog) -> MaterializeReport {
        let entries: Vec<EntryOutcome> = catalog
            .iter()
            .map(|(name, entry)| self.materialize_entry(name, entry))
            .collect();
        let report = MaterializeReport { entries };
        tracing::info!(
            tables = report.entries.len(),
            materialized = report.materialized_count(),
            degraded = report.degraded_count(),
            "materialized catalog"
        );
        report
    }

    pub fn materialize_entry(&self, name: &str, entry: &CatalogEntry) -> EntryOutcome {
        let mut warnings = Vec::new();
        let result = validate_name(name)
            .and_then(|()| self.view_sql(name, entry, &mut warnings))
            .and_then(|sql| {
                self.engine
                    .execute(&sql)
                    .map(|()| sql)
                    .map_err(|e| ProxyError::ViewCreation {
                        view: name.to_string(),
                        reason: e.to_string(),
                    })
            });

        let status = match result {
            Ok(sql) => {
                tracing::debug!(table = name, kind = entry.kind(), "created view");
                EntryStatus::Materialized { sql }
            }
            Err(e) => self.degrade(name, entry, &e),
        };

        EntryOutcome {
            name: name.to_string(),
            status,
            warnings,
        }
    }

    fn view_sql(
        &self,
        name: &str,
        entry: &CatalogEntry,
        warnings: &mut Vec<RewriteWarning>,
    ) -> Result<String> {
        match entry {
            CatalogEntry::Dummy => Ok(dummy_view_sql(name)),
            CatalogEntry::QueryView { template } => {
                let outcome = self.manager.rewrite(template);
                warnings.extend(outcome.warnings.iter().cloned());
                let outcome = self.manager.apply_policy(outcome)?;
                query_view_sql(name, &outcome.query)
            }
            CatalogEntry::RawTable {
                bucket,
                prefix,
                format,
            } => {
                let pattern =
                    WildcardPattern::with_extension(prefix.as_str(), format.extension());
                let object = self.manager.resolve_pattern(bucket, &pattern)?;
                let path = self.manager.fetch(&object)?;
                Ok(raw_table_view_sql(name, *format, &path.to_string_lossy()))
            }
        }
    }

    fn degrade(&self, name: &str, entry: &CatalogEntry, error: &ProxyError) -> EntryStatus {
        let reason = error.to_string();
        tracing::warn!(
            table = name,
            kind = entry.kind(),
            error = %reason,
            "creating fallback view"
        );

        // an invalid name would be just as invalid for the fallback view
        let fallback_created = validate_name(name).is_ok()
            && match self.engine.execute(&fallback_view_sql(name, &reason)) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(table = name, error = %e, "fallback view could not be created");
                    false
                }
            };

        EntryStatus::Degraded {
            reason,
            fallback_created,
        }
    }
}
