#![forbid(unsafe_code)]

//! Paginated execution and cursor management.
//!
//! A [`QueryEngine`] owns the schema, dialect and policy and can be shared
//! between threads. Each caller drives its own [`Session`], which owns an
//! execution backend and the cursors opened through it.
//!
//! Cursor lifecycle:
//!
//! - a request without a continuation token is compiled, executed and its
//!   first page fetched; the cursor is then open or already exhausted;
//! - a continuation with `max_rows > 0` fetches the next page;
//! - a continuation with `max_rows <= 0` closes the cursor;
//! - an exhausted cursor is released and its token reset to 0.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::backend::{ExecutionBackend, PermissionCatalog};
use crate::catalog::SchemaGraph;
use crate::types::{ColumnId, ContinuationToken, QueryError, Result, StatementId};

use super::access::{AccessPolicy, AccessSettings, RowPermissionChecker};
use super::compiler::{CompileOptions, CompiledQuery, QueryCompiler};
use super::dialect::Dialect;
use super::request::{CallerIdentity, PrivilegeLevel, QueryRequest};
use super::result::{ResultSettings, ResultTable};

/// Lifecycle state reported with every result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Compiled but not executed.
    Fresh,
    /// More pages may follow.
    Open,
    /// Drained and released.
    Exhausted,
    /// Closed by the caller.
    Closed,
}

/// One page of a query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Rows of this page.
    pub table: ResultTable,
    /// Token resuming the cursor; 0 once exhausted or closed.
    pub continuation: ContinuationToken,
    /// Total row count, when requested.
    pub total_count: Option<u64>,
    /// Cursor state after this call.
    pub state: CursorState,
}

impl QueryResult {
    fn empty(columns: Vec<ColumnId>, settings: ResultSettings, state: CursorState) -> Self {
        Self {
            table: ResultTable::new(columns, settings),
            continuation: ContinuationToken::EXHAUSTED,
            total_count: None,
            state,
        }
    }
}

/// Shared, thread-safe query engine.
#[derive(Debug)]
pub struct QueryEngine {
    schema: RwLock<Arc<SchemaGraph>>,
    dialect: Dialect,
    access: AccessSettings,
    policy: AccessPolicy,
    results: ResultSettings,
    log_sql: bool,
    next_token: AtomicU64,
}

impl QueryEngine {
    /// Creates an engine over a validated schema.
    pub fn new(schema: SchemaGraph, dialect: Dialect) -> Result<Self> {
        schema.validate()?;
        Ok(Self {
            schema: RwLock::new(Arc::new(schema)),
            dialect,
            access: AccessSettings::default(),
            policy: AccessPolicy::default(),
            results: ResultSettings::default(),
            log_sql: false,
            next_token: AtomicU64::new(1),
        })
    }

    /// Applies access settings; a strict setting makes the policy strict.
    pub fn with_access(mut self, access: AccessSettings) -> Self {
        self.policy.configure(access.strict);
        self.access = access;
        self
    }

    /// Applies result buffer settings.
    pub fn with_results(mut self, results: ResultSettings) -> Self {
        self.results = results;
        self
    }

    /// Logs compiled SQL at debug level when enabled.
    pub fn with_sql_logging(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    /// Current schema snapshot.
    pub fn schema(&self) -> Arc<SchemaGraph> {
        Arc::clone(&self.schema.read())
    }

    /// Replaces the schema after validating it. Compilations already holding
    /// a snapshot keep using the old one.
    pub fn reload_schema(&self, schema: SchemaGraph) -> Result<()> {
        schema.validate()?;
        *self.schema.write() = Arc::new(schema);
        debug!("genquery.schema.reload");
        Ok(())
    }

    /// Dialect capabilities.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Access settings.
    pub fn access_settings(&self) -> &AccessSettings {
        &self.access
    }

    /// Requests a policy change; returns whether the policy is strict afterwards.
    pub fn set_access_policy(&self, strict: bool) -> bool {
        self.policy.configure(strict)
    }

    /// Compiles `request` for `caller` against the current schema.
    pub fn compile_query(
        &self,
        request: &QueryRequest,
        caller: &CallerIdentity,
    ) -> Result<CompiledQuery> {
        self.compile_with(&self.schema(), request, caller)
    }

    fn compile_with(
        &self,
        schema: &SchemaGraph,
        request: &QueryRequest,
        caller: &CallerIdentity,
    ) -> Result<CompiledQuery> {
        let options = CompileOptions {
            strict: self.policy.is_strict(),
            anonymous_user: &self.access.anonymous_user,
            log_sql: self.log_sql,
        };
        QueryCompiler::new(schema, &self.dialect)
            .with_options(options)
            .compile(request, caller)
    }

    /// Opens a session over `backend`.
    pub fn session<B>(&self, backend: B) -> Session<'_, B>
    where
        B: ExecutionBackend + PermissionCatalog,
    {
        Session {
            engine: self,
            backend,
            caller: CallerIdentity::default(),
            cursors: FxHashMap::default(),
        }
    }

    fn next_token(&self) -> ContinuationToken {
        loop {
            let token = self.next_token.fetch_add(1, Ordering::Relaxed);
            if token != 0 {
                return ContinuationToken(token);
            }
        }
    }
}

#[derive(Debug)]
struct Cursor {
    statement: StatementId,
    columns: Vec<ColumnId>,
    checker: Option<RowPermissionChecker>,
    pending: Option<Vec<String>>,
    delivered: u64,
    total_count: Option<u64>,
}

/// One caller's view of an engine: identity, backend and open cursors.
pub struct Session<'e, B> {
    engine: &'e QueryEngine,
    backend: B,
    caller: CallerIdentity,
    cursors: FxHashMap<ContinuationToken, Cursor>,
}

impl<'e, B> Session<'e, B>
where
    B: ExecutionBackend + PermissionCatalog,
{
    /// Sets who subsequent requests run as.
    pub fn set_caller_identity(
        &mut self,
        user: impl Into<String>,
        zone: impl Into<String>,
        privilege: PrivilegeLevel,
    ) {
        self.caller = CallerIdentity::new(user, zone, privilege);
    }

    /// Current caller.
    pub fn caller(&self) -> &CallerIdentity {
        &self.caller
    }

    /// Requests an engine-wide policy change.
    pub fn set_access_policy(&self, strict: bool) -> bool {
        self.engine.set_access_policy(strict)
    }

    /// Compiles without executing.
    pub fn compile_query(&self, request: &QueryRequest) -> Result<CompiledQuery> {
        self.engine.compile_query(request, &self.caller)
    }

    /// Number of open cursors.
    pub fn open_cursors(&self) -> usize {
        self.cursors.len()
    }

    /// State of the cursor behind `token`. Token 0 names no cursor yet.
    pub fn cursor_state(&self, token: ContinuationToken) -> CursorState {
        if token.is_exhausted() {
            CursorState::Fresh
        } else if self.cursors.contains_key(&token) {
            CursorState::Open
        } else {
            CursorState::Closed
        }
    }

    /// Backend handle.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Starts, continues or closes a query.
    pub fn execute_query(&mut self, request: &QueryRequest) -> Result<QueryResult> {
        if !request.is_continuation() {
            return self.execute_fresh(request);
        }
        let token = request.continuation;
        if request.max_rows <= 0 {
            self.close_query(token)?;
            return Ok(QueryResult::empty(
                Vec::new(),
                self.engine.results,
                CursorState::Closed,
            ));
        }
        let cursor = self
            .cursors
            .remove(&token)
            .ok_or(QueryError::CursorNotFound { token })?;
        self.fetch_page(token, cursor, request.max_rows)
    }

    /// Closes the cursor behind `token`. Unknown or already closed tokens are
    /// accepted.
    pub fn close_query(&mut self, token: ContinuationToken) -> Result<ContinuationToken> {
        if let Some(cursor) = self.cursors.remove(&token) {
            debug!(token = %token, "genquery.cursor.close");
            self.backend.close_statement(cursor.statement)?;
        }
        Ok(ContinuationToken::EXHAUSTED)
    }

    fn execute_fresh(&mut self, request: &QueryRequest) -> Result<QueryResult> {
        let engine = self.engine;
        let schema = engine.schema();
        let compiled = engine.compile_with(&schema, request, &self.caller)?;
        let checker = match &request.permission_check {
            Some(check) => RowPermissionChecker::new(
                check,
                &engine.access.local_zone,
                &schema,
                &compiled.select,
            )?,
            None => None,
        };
        let dialect = engine.dialect();
        let mut total_count = None;
        if request.total_count && dialect.count_query {
            let count = self
                .backend
                .run_scalar_query(&compiled.count_sql, &compiled.count_binds)?;
            total_count = Some(count.max(0) as u64);
        }
        let statement =
            self.backend
                .run_query(&compiled.sql, &compiled.binds, dialect.skip_rows(request.offset))?;
        let first = match self.backend.fetch_next_row(statement) {
            Ok(row) => row,
            Err(err) => {
                self.release(statement);
                return Err(err.into());
            }
        };
        let columns: Vec<ColumnId> = compiled.select.iter().map(|s| s.column).collect();
        let Some(first) = first else {
            self.release(statement);
            if request.total_count && total_count.is_none() {
                total_count = if request.offset > 0 {
                    self.requery_count(request)
                } else {
                    Some(0)
                };
            }
            return Err(QueryError::NoRows { total_count });
        };
        if request.total_count && total_count.is_none() {
            match self.backend.row_count(statement) {
                Ok(rows) => total_count = Some(rows + request.offset),
                Err(err) => {
                    self.release(statement);
                    return Err(err.into());
                }
            }
        }
        if request.max_rows <= 0 {
            self.release(statement);
            let mut result = QueryResult::empty(columns, engine.results, CursorState::Exhausted);
            result.total_count = total_count;
            return Ok(result);
        }
        let token = engine.next_token();
        debug!(token = %token, statement = %statement, "genquery.cursor.open");
        let cursor = Cursor {
            statement,
            columns,
            checker,
            pending: Some(first),
            delivered: 0,
            total_count,
        };
        self.fetch_page(token, cursor, request.max_rows)
    }

    /// Re-runs the query at offset 0 to learn how many rows it has. Failures
    /// only lose the count.
    fn requery_count(&mut self, request: &QueryRequest) -> Option<u64> {
        let retry = QueryRequest {
            offset: 0,
            ..request.clone()
        };
        match self.count_rows(&retry) {
            Ok(rows) => {
                debug!(rows, offset = request.offset, "genquery.count.requery");
                Some(rows)
            }
            Err(err) => {
                warn!(error = %err, "genquery.count.requery_failed");
                None
            }
        }
    }

    fn count_rows(&mut self, request: &QueryRequest) -> Result<u64> {
        let compiled = self.engine.compile_query(request, &self.caller)?;
        let statement = self.backend.run_query(&compiled.sql, &compiled.binds, 0)?;
        let rows = self.backend.row_count(statement);
        self.release(statement);
        Ok(rows?)
    }

    fn fetch_page(
        &mut self,
        token: ContinuationToken,
        mut cursor: Cursor,
        max_rows: i64,
    ) -> Result<QueryResult> {
        let mut table = ResultTable::new(cursor.columns.iter().copied(), self.engine.results);
        let exhausted = match self.fill_page(&mut cursor, &mut table, max_rows) {
            Ok(exhausted) => exhausted,
            Err(err) => {
                debug!(token = %token, error = %err, "genquery.cursor.abort");
                self.release(cursor.statement);
                return Err(err);
            }
        };
        cursor.delivered += table.row_count() as u64;
        if !exhausted {
            let total_count = cursor.total_count;
            self.cursors.insert(token, cursor);
            return Ok(QueryResult {
                table,
                continuation: token,
                total_count,
                state: CursorState::Open,
            });
        }
        debug!(token = %token, rows = cursor.delivered, "genquery.cursor.exhausted");
        self.release(cursor.statement);
        if cursor.delivered == 0 {
            return Err(QueryError::NoRows {
                total_count: cursor.total_count,
            });
        }
        Ok(QueryResult {
            table,
            continuation: ContinuationToken::EXHAUSTED,
            total_count: cursor.total_count,
            state: CursorState::Exhausted,
        })
    }

    /// Fills `table` with up to `max_rows` rows. Returns true once the
    /// statement is drained.
    fn fill_page(
        &mut self,
        cursor: &mut Cursor,
        table: &mut ResultTable,
        max_rows: i64,
    ) -> Result<bool> {
        while (table.row_count() as i64) < max_rows {
            let row = match cursor.pending.take() {
                Some(row) => row,
                None => match self.backend.fetch_next_row(cursor.statement)? {
                    Some(row) => row,
                    None => return Ok(true),
                },
            };
            if let Some(checker) = cursor.checker.as_mut() {
                checker.check_row(&row, &mut self.backend)?;
            }
            table.push_row(&row)?;
        }
        Ok(false)
    }

    fn release(&mut self, statement: StatementId) {
        if let Err(err) = self.backend.close_statement(statement) {
            warn!(statement = %statement, error = %err, "genquery.statement.close_failed");
        }
    }
}
