//! Query engine seam used by the catalog materializer

use std::fmt::Debug;

use crate::Result;

/// Executes statements against an embedded analytical engine
///
/// Implementations must serialize statements on a shared handle; the
/// materializer may be driven from several threads.
pub trait QueryEngine: Send + Sync + Debug {
    /// Run exactly one statement that produces no result set
    ///
    /// Text holding several statements is an error, not a batch.
    fn execute(&self, sql: &str) -> Result<()>;
}
