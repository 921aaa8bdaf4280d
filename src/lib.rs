//! # DuckDB Object Proxy
//!
//! A caching proxy that lets DuckDB query objects hosted behind an
//! authenticated object-store HTTP API.
//!
//! ## Overview
//!
//! The proxy:
//! - **Resolves** wildcard references (`*.csv`, `logs/*.parquet`) against the remote listing API
//! - **Caches** downloaded objects on local disk with a time-to-live
//! - **Rewrites** remote URI literals in query text to local file paths
//! - **Materializes** a declarative catalog into engine views, one failure at a time
//!
//! ## Example
//!
//! ```no_run
//! # fn example() -> duckdb_object_proxy::Result<()> {
//! use duckdb_object_proxy::{
//!     CacheManager, Catalog, CatalogMaterializer, DuckdbEngine, ProxyConfig, QueryEngine,
//! };
//!
//! let manager = CacheManager::new(ProxyConfig::from_env()?)?;
//! let engine = DuckdbEngine::open_in_memory()?;
//!
//! let catalog = Catalog::from_path("catalog.yml")?;
//! let report = CatalogMaterializer::new(&manager, &engine).materialize(&catalog);
//! println!("{} tables degraded", report.degraded_count());
//!
//! let rewritten = manager.rewrite_strict(
//!     "CREATE VIEW q1 AS SELECT * FROM \
//!      read_csv_auto('http://localhost:8001/buckets/sales/objects/*.csv')",
//! )?;
//! engine.execute(&rewritten.query)?;
//! # Ok(())
//! # }
//! ```

pub mod cache_manager;
pub mod cache_store;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod discovery;
pub mod downloader;
pub mod engine;
pub mod error;
pub mod listing;
pub mod materializer;
pub mod path_resolver;
pub mod remote_client;
pub mod rewriter;
pub mod types;
pub mod wildcard;

// Query engines (feature-gated)
#[cfg(feature = "engine-duckdb")]
pub mod engine_duckdb;

// Result type for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

// Re-export main types for convenience
pub use cache_manager::CacheManager;
pub use cache_store::{CacheEntry, CacheStore};
pub use catalog::{Catalog, CatalogEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ProxyConfig, UnresolvedUriPolicy};
pub use discovery::discover_catalog;
pub use downloader::Downloader;
pub use engine::QueryEngine;
pub use error::{ProxyError, RewriteWarning};
pub use materializer::{CatalogMaterializer, EntryOutcome, EntryStatus, MaterializeReport};
pub use path_resolver::parse_remote_uri;
pub use remote_client::{HttpDirectory, ObjectBody, ObjectDirectory};
pub use rewriter::{rewrite_query, RewriteOutcome};
pub use types::{ObjectDescriptor, ObjectRef, RawFormat};
pub use wildcard::WildcardPattern;

#[cfg(feature = "engine-duckdb")]
pub use engine_duckdb::DuckdbEngine;
