#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

use super::{ColumnId, ContinuationToken};

/// Registry capacity that a schema registration exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaLimitKind {
    /// Table registry is full.
    Tables,
    /// Column registry is full.
    Columns,
    /// Link registry is full.
    Links,
}

impl fmt::Display for SchemaLimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaLimitKind::Tables => write!(f, "tables"),
            SchemaLimitKind::Columns => write!(f, "columns"),
            SchemaLimitKind::Links => write!(f, "links"),
        }
    }
}

/// Broad error category used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Broken registration or unknown identifier.
    Schema,
    /// Referenced tables cannot be linked.
    Graph,
    /// Malformed operator/literal or unsupported compound nesting.
    ConditionSyntax,
    /// Caller lacks the required access.
    Permission,
    /// No rows, or no cursor behind a token.
    NotFound,
    /// Result buffer growth failed or hit the operational cap.
    Resource,
    /// Opaque failure from the relational layer.
    Backend,
    /// Structurally invalid request.
    InvalidRequest,
}

/// Failure reported by an execution backend, passed through unchanged.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Error raised by the SQLite driver.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Statement handle is not (or no longer) open.
    #[error("statement {0} is not open")]
    UnknownStatement(u64),
    /// Free-form backend failure.
    #[error("{0}")]
    Message(String),
}

/// Errors emitted while compiling or executing generic queries.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A table name was registered twice.
    #[error("table '{name}' is already registered")]
    DuplicateTable { name: String },
    /// A column id was registered twice.
    #[error("column {column} is already registered")]
    DuplicateColumn { column: ColumnId },
    /// A registration or lookup referenced a table that does not exist.
    #[error("unknown table '{name}'")]
    UnknownTable { name: String },
    /// A request or registration referenced an unknown column id.
    #[error("unknown column {column}")]
    UnknownColumn { column: ColumnId },
    /// A registry reached its configured capacity.
    #[error("schema registry for {kind} is full (max {max})")]
    SchemaLimitExceeded { kind: SchemaLimitKind, max: usize },
    /// The non-cycler part of the schema graph contains a cycle.
    #[error("schema graph has a cycle closing at table '{table}' via link '{link}'")]
    SchemaCycle { table: String, link: String },
    /// Schema definition is internally inconsistent.
    #[error("invalid schema definition: {reason}")]
    InvalidSchema { reason: String },
    /// The referenced tables span disconnected schema regions.
    #[error("failed to link tables: {} unreachable", .unreachable.join(", "))]
    UnlinkedTables { unreachable: Vec<String> },
    /// A condition could not be compiled.
    #[error("invalid condition '{condition}': {reason}")]
    ConditionSyntax {
        condition: String,
        reason: &'static str,
    },
    /// Access was denied.
    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },
    /// The query produced no rows.
    #[error("no rows found")]
    NoRows {
        /// Total row count recovered for callers that requested it.
        total_count: Option<u64>,
    },
    /// No open cursor is bound to the continuation token.
    #[error("no open cursor for continuation token {token}")]
    CursorNotFound { token: ContinuationToken },
    /// Result buffer growth failed.
    #[error("result buffer: {reason}")]
    Resource { reason: String },
    /// Request is structurally unusable.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: &'static str },
    /// Relational backend failure.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl QueryError {
    /// Builds a [`QueryError::ConditionSyntax`] for the given condition text.
    pub fn condition(condition: impl Into<String>, reason: &'static str) -> Self {
        QueryError::ConditionSyntax {
            condition: condition.into(),
            reason,
        }
    }

    /// Builds a [`QueryError::PermissionDenied`].
    pub fn denied(reason: impl Into<String>) -> Self {
        QueryError::PermissionDenied {
            reason: reason.into(),
        }
    }

    /// Returns the broad category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::DuplicateTable { .. }
            | QueryError::DuplicateColumn { .. }
            | QueryError::UnknownTable { .. }
            | QueryError::UnknownColumn { .. }
            | QueryError::SchemaLimitExceeded { .. }
            | QueryError::SchemaCycle { .. }
            | QueryError::InvalidSchema { .. } => ErrorKind::Schema,
            QueryError::UnlinkedTables { .. } => ErrorKind::Graph,
            QueryError::ConditionSyntax { .. } => ErrorKind::ConditionSyntax,
            QueryError::PermissionDenied { .. } => ErrorKind::Permission,
            QueryError::NoRows { .. } | QueryError::CursorNotFound { .. } => ErrorKind::NotFound,
            QueryError::Resource { .. } => ErrorKind::Resource,
            QueryError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            QueryError::Backend(_) => ErrorKind::Backend,
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::DuplicateTable { .. } => "DuplicateTable",
            QueryError::DuplicateColumn { .. } => "DuplicateColumn",
            QueryError::UnknownTable { .. } => "UnknownTable",
            QueryError::UnknownColumn { .. } => "UnknownColumn",
            QueryError::SchemaLimitExceeded { .. } => "SchemaLimitExceeded",
            QueryError::SchemaCycle { .. } => "SchemaCycle",
            QueryError::InvalidSchema { .. } => "InvalidSchema",
            QueryError::UnlinkedTables { .. } => "FailedToLinkTables",
            QueryError::ConditionSyntax { .. } => "ConditionSyntax",
            QueryError::PermissionDenied { .. } => "PermissionDenied",
            QueryError::NoRows { .. } => "NoRowsFound",
            QueryError::CursorNotFound { .. } => "CursorNotFound",
            QueryError::Resource { .. } => "ResourceExhausted",
            QueryError::InvalidRequest { .. } => "InvalidRequest",
            QueryError::Backend(_) => "Backend",
        }
    }

    /// Only backend failures may succeed when the same request is repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::Backend(_))
    }

    /// Total count carried by a no-rows result, if one was recovered.
    pub fn recovered_total_count(&self) -> Option<u64> {
        match self {
            QueryError::NoRows { total_count } => *total_count,
            _ => None,
        }
    }
}

/// Convenience wrapper that formats query errors with their codes.
pub struct QueryErrorWithCode<'a>(pub &'a QueryError);

impl fmt::Display for QueryErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
