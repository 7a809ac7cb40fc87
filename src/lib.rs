//! Generic query compiler and paginated executor for metadata catalogs.
//!
//! Callers describe a query as a list of catalog column ids plus conditions;
//! the compiler discovers the tables involved, joins them along the schema
//! graph, injects access filters and emits SQL with positional binds. A
//! [`query::Session`] runs the SQL page by page through an
//! [`backend::ExecutionBackend`].

#![warn(missing_docs)]

pub mod backend;
pub mod catalog;
pub mod config;
pub mod query;
pub mod types;

pub use catalog::{SchemaGraph, TransientState};
pub use config::{ConfigError, EngineConfig};
pub use query::{
    QueryBuilder, QueryCompiler, QueryEngine, QueryRequest, QueryResult, Session,
};
pub use types::{BackendError, ColumnId, ContinuationToken, QueryError, Result};
