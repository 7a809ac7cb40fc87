#![forbid(unsafe_code)]

//! Shared identifiers and the crate-wide error type.

use std::fmt;

/// Error taxonomy shared by the compiler, executor and collaborators.
pub mod error;

pub use error::{BackendError, ErrorKind, QueryError, QueryErrorWithCode, SchemaLimitKind};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Position of a table inside a [`crate::catalog::SchemaGraph`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct TableId(pub usize);

/// Abstract, backend-agnostic column identifier used by generic queries.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ColumnId(pub u32);

/// Position of a link (join predicate) inside a schema graph.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct LinkId(pub usize);

/// Handle to an open statement held by an execution backend.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct StatementId(pub u64);

/// Opaque handle used to resume a paginated query. Zero means exhausted.
#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Debug,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct ContinuationToken(pub u64);

impl ContinuationToken {
    /// Token returned once a cursor has been released.
    pub const EXHAUSTED: ContinuationToken = ContinuationToken(0);

    /// Returns true when no cursor is associated with this token.
    pub fn is_exhausted(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ColumnId {
    fn from(value: u32) -> Self {
        ColumnId(value)
    }
}

impl From<ColumnId> for u32 {
    fn from(value: ColumnId) -> Self {
        value.0
    }
}

impl From<u64> for ContinuationToken {
    fn from(value: u64) -> Self {
        ContinuationToken(value)
    }
}
