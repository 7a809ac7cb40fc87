#![forbid(unsafe_code)]

//! Generic query compilation and paginated execution.
//!
//! A [`QueryRequest`] flows through the compiler (conditions, join
//! resolution, access filters) into SQL text with positional binds, which a
//! [`Session`] executes page by page against an execution backend.

/// Access policy, row filters and per-row permission checks.
pub mod access;

/// Fluent request builder.
pub mod builder;

/// Structured SQL clauses.
pub mod clause;

/// Select/condition compilation and final SQL assembly.
pub mod compiler;

/// Condition expression parsing and rendering.
pub mod condition;

/// Dialect capabilities.
pub mod dialect;

/// Engine, sessions and cursors.
pub mod executor;

/// Request data model.
pub mod request;

/// Spanning-tree join resolution.
pub mod resolver;

/// Result page buffers.
pub mod result;

pub use access::{AccessPolicy, AccessSettings, RowPermissionChecker};
pub use builder::QueryBuilder;
pub use compiler::{CompileOptions, CompiledQuery, QueryCompilationContext, QueryCompiler};
pub use dialect::{Dialect, PaginationSyntax};
pub use executor::{CursorState, QueryEngine, QueryResult, Session};
pub use request::{
    AccessLevel, Aggregation, CallerIdentity, Condition, OrderBy, PrivilegeLevel, QueryRequest,
    RowPermissionCheck, SelectColumn, DEFAULT_MAX_ROWS,
};
pub use result::{ResultSettings, ResultTable};
