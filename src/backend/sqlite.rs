#![forbid(unsafe_code)]

//! Execution backend over an embedded SQLite catalog.
//!
//! Statements are materialized on `run_query`: rows are converted to text and
//! buffered until fetched or closed, so no borrow of the connection outlives
//! a call.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::catalog::GrantChain;
use crate::query::AccessLevel;
use crate::types::{BackendError, StatementId};

use super::{ExecutionBackend, PermissionCatalog};

struct BufferedStatement {
    rows: std::vec::IntoIter<Vec<String>>,
    count: u64,
}

/// SQLite-backed [`ExecutionBackend`] and [`PermissionCatalog`].
pub struct SqliteBackend {
    conn: Connection,
    statements: FxHashMap<u64, BufferedStatement>,
    next_statement: u64,
    grant_chain: GrantChain,
}

impl SqliteBackend {
    /// Opens (or creates) a catalog database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    /// Opens a private in-memory catalog.
    pub fn open_in_memory() -> Result<Self, BackendError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    /// Wraps an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            statements: FxHashMap::default(),
            next_statement: 1,
            grant_chain: GrantChain::default(),
        }
    }

    /// Overrides the tables consulted by permission checks.
    pub fn with_grant_chain(mut self, chain: GrantChain) -> Self {
        self.grant_chain = chain;
        self
    }

    /// Underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Underlying connection, mutably.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Number of statements not yet closed.
    pub fn open_statements(&self) -> usize {
        self.statements.len()
    }

    fn statement(&mut self, id: StatementId) -> Result<&mut BufferedStatement, BackendError> {
        self.statements
            .get_mut(&id.0)
            .ok_or(BackendError::UnknownStatement(id.0))
    }
}

fn value_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => v.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => hex::encode(bytes),
    }
}

impl ExecutionBackend for SqliteBackend {
    fn run_query(
        &mut self,
        sql: &str,
        binds: &[String],
        skip_rows: u64,
    ) -> Result<StatementId, BackendError> {
        let mut stmt = self.conn.prepare(sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(binds.iter()))?;
        let mut buffered = Vec::new();
        let mut skipped = 0u64;
        while let Some(row) = rows.next()? {
            if skipped < skip_rows {
                skipped += 1;
                continue;
            }
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(value_text(row.get_ref(idx)?));
            }
            buffered.push(values);
        }
        let id = self.next_statement;
        self.next_statement += 1;
        let count = buffered.len() as u64;
        trace!(statement = id, rows = count, skipped, "sqlite.run_query");
        self.statements.insert(
            id,
            BufferedStatement {
                rows: buffered.into_iter(),
                count,
            },
        );
        Ok(StatementId(id))
    }

    fn fetch_next_row(
        &mut self,
        statement: StatementId,
    ) -> Result<Option<Vec<String>>, BackendError> {
        Ok(self.statement(statement)?.rows.next())
    }

    fn row_count(&mut self, statement: StatementId) -> Result<u64, BackendError> {
        Ok(self.statement(statement)?.count)
    }

    fn close_statement(&mut self, statement: StatementId) -> Result<(), BackendError> {
        self.statements.remove(&statement.0);
        Ok(())
    }

    fn run_scalar_query(&mut self, sql: &str, binds: &[String]) -> Result<i64, BackendError> {
        let value = self
            .conn
            .query_row(sql, params_from_iter(binds.iter()), |row| row.get::<_, i64>(0))?;
        Ok(value)
    }
}

impl PermissionCatalog for SqliteBackend {
    fn check_object_access(
        &mut self,
        object_id: &str,
        user: &str,
        zone: &str,
        level: AccessLevel,
    ) -> Result<bool, BackendError> {
        let chain = &self.grant_chain;
        let sql = format!(
            "select count(*) from {user_table} UM, {group} UG, {access} OA, {token} TM \
             where UM.user_name = ?1 and UM.zone_name = ?2 and UM.user_id = UG.user_id \
             and UG.group_user_id = OA.user_id and OA.object_id = ?3 \
             and OA.access_type_id >= TM.token_id and TM.token_namespace = '{namespace}' \
             and TM.token_name = ?4",
            user_table = chain.user_table,
            group = chain.group_table,
            access = chain.access_table,
            token = chain.token_table,
            namespace = chain.token_namespace,
        );
        let grants: i64 = self.conn.query_row(
            &sql,
            rusqlite::params![user, zone, object_id, level.token_name()],
            |row| row.get(0),
        )?;
        Ok(grants > 0)
    }
}
