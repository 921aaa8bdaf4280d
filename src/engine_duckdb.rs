//! DuckDB implementation of [`QueryEngine`]

use std::fmt;
use std::path::Path;

use duckdb::Connection;
use parking_lot::Mutex;

use crate::engine::QueryEngine;
use crate::Result;

pub struct DuckdbEngine {
    conn: Mutex<Connection>,
}

impl fmt::Debug for DuckdbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuckdbEngine").finish_non_exhaustive()
    }
}

impl DuckdbEngine {
    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run `f` with exclusive access to the underlying connection
    pub fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> R) -> R {
        let conn = self.conn.lock();
        f(&conn)
    }
}

impl QueryEngine for DuckdbEngine {
    fn execute(&self, sql: &str) -> Result<()> {
        tracing::debug!(sql, "executing statement");
        self.conn.lock().execute(sql, [])?;
        Ok(())
    }
}
