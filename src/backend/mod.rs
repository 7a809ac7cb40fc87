#![forbid(unsafe_code)]

//! Collaborators consumed by the executor: a relational execution handle and
//! a permission catalog.

use crate::query::AccessLevel;
use crate::types::{BackendError, StatementId};

/// Standard catalog DDL and demo data.
pub mod seed;

/// rusqlite-backed collaborators.
pub mod sqlite;

pub use sqlite::SqliteBackend;

/// Blocking execution handle over a relational store.
///
/// Calls are never retried by the executor; connection-level retry belongs to
/// whoever owns the handle.
pub trait ExecutionBackend {
    /// Prepares and runs `sql` with positional text binds, discarding the
    /// first `skip_rows` rows.
    fn run_query(
        &mut self,
        sql: &str,
        binds: &[String],
        skip_rows: u64,
    ) -> Result<StatementId, BackendError>;

    /// Next row of an open statement, or `None` once drained.
    fn fetch_next_row(&mut self, statement: StatementId)
        -> Result<Option<Vec<String>>, BackendError>;

    /// Number of rows the statement produced after skipping.
    fn row_count(&mut self, statement: StatementId) -> Result<u64, BackendError>;

    /// Releases an open statement. Closing an unknown statement is not an error.
    fn close_statement(&mut self, statement: StatementId) -> Result<(), BackendError>;

    /// Runs a query returning a single integer.
    fn run_scalar_query(&mut self, sql: &str, binds: &[String]) -> Result<i64, BackendError>;
}

/// Answers per-object access questions against the catalog.
pub trait PermissionCatalog {
    /// Returns true when `user` of `zone` holds at least `level` on the object.
    fn check_object_access(
        &mut self,
        object_id: &str,
        user: &str,
        zone: &str,
        level: AccessLevel,
    ) -> Result<bool, BackendError>;
}
