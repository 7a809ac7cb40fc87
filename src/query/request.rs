#![forbid(unsafe_code)]

//! Generic query request model.
//!
//! Requests are plain data and deserialize from JSON:
//!
//! ```json
//! {
//!   "select": [{"column": 403}, {"column": 501, "order": "desc"}],
//!   "conditions": [{"column": 403, "expression": "like 'run%'"}],
//!   "max_rows": 10,
//!   "total_count": true
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{ColumnId, ContinuationToken, QueryError};

/// Page size used when a request does not name one.
pub const DEFAULT_MAX_ROWS: i64 = 256;

/// Aggregate applied to a selected column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Plain column.
    #[default]
    None,
    /// `min(col)`
    Min,
    /// `max(col)`
    Max,
    /// `sum(col)`
    Sum,
    /// `avg(col)`
    Avg,
    /// `count(col)`
    Count,
}

impl Aggregation {
    /// SQL function name, if any.
    pub fn function(self) -> Option<&'static str> {
        match self {
            Aggregation::None => None,
            Aggregation::Min => Some("min"),
            Aggregation::Max => Some("max"),
            Aggregation::Sum => Some("sum"),
            Aggregation::Avg => Some("avg"),
            Aggregation::Count => Some("count"),
        }
    }

    /// Returns true for every variant except [`Aggregation::None`].
    pub fn is_aggregate(self) -> bool {
        self != Aggregation::None
    }
}

/// Ordering requested for a selected column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    /// Not part of ORDER BY unless canonical.
    #[default]
    None,
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// One entry of the select list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectColumn {
    /// Abstract column id.
    pub column: ColumnId,
    /// Aggregate to apply.
    #[serde(default)]
    pub aggregate: Aggregation,
    /// Ordering flag.
    #[serde(default)]
    pub order: OrderBy,
}

impl SelectColumn {
    /// Plain, unordered column.
    pub fn new(column: ColumnId) -> Self {
        Self {
            column,
            aggregate: Aggregation::None,
            order: OrderBy::None,
        }
    }
}

/// One entry of the condition list: a column and an operator expression such
/// as `= 'foo'`, `n>= '10'` or `like 'a%' || like 'b%'`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Abstract column id.
    pub column: ColumnId,
    /// Operator expression.
    pub expression: String,
}

/// Caller privilege ladder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeLevel {
    /// Unauthenticated.
    #[default]
    None,
    /// Authenticated user of another zone.
    RemoteUser,
    /// Authenticated user of the local zone.
    LocalUser,
    /// Administrator of another zone.
    RemoteAdmin,
    /// Administrator of the local zone; bypasses row filters.
    LocalAdmin,
}

impl PrivilegeLevel {
    /// Only local administrators bypass access control.
    pub fn is_local_admin(self) -> bool {
        self == PrivilegeLevel::LocalAdmin
    }
}

impl FromStr for PrivilegeLevel {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(PrivilegeLevel::None),
            "remote_user" => Ok(PrivilegeLevel::RemoteUser),
            "local_user" => Ok(PrivilegeLevel::LocalUser),
            "remote_admin" => Ok(PrivilegeLevel::RemoteAdmin),
            "local_admin" => Ok(PrivilegeLevel::LocalAdmin),
            _ => Err(QueryError::InvalidRequest {
                reason: "unknown privilege level",
            }),
        }
    }
}

/// Who is asking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// User name.
    pub user: String,
    /// Zone name.
    pub zone: String,
    /// Privilege level.
    pub privilege: PrivilegeLevel,
}

impl CallerIdentity {
    /// Builds an identity.
    pub fn new(user: impl Into<String>, zone: impl Into<String>, privilege: PrivilegeLevel) -> Self {
        Self {
            user: user.into(),
            zone: zone.into(),
            privilege,
        }
    }
}

/// Access level named by a grant token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// `read object`
    #[default]
    Read,
    /// `modify object`
    Modify,
    /// `own`
    Own,
}

impl AccessLevel {
    /// Token name stored in the catalog.
    pub fn token_name(self) -> &'static str {
        match self {
            AccessLevel::Read => "read object",
            AccessLevel::Modify => "modify object",
            AccessLevel::Own => "own",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token_name())
    }
}

impl FromStr for AccessLevel {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" | "read object" => Ok(AccessLevel::Read),
            "modify" | "write" | "modify object" => Ok(AccessLevel::Modify),
            "own" => Ok(AccessLevel::Own),
            _ => Err(QueryError::InvalidRequest {
                reason: "unknown access level",
            }),
        }
    }
}

/// Per-row permission check requested alongside a query. Every returned row
/// must grant `level` to `user` in `zone`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowPermissionCheck {
    /// User whose access is checked; empty means "zone only".
    pub user: String,
    /// Zone of the user; empty means the local zone.
    pub zone: String,
    /// Minimum access level.
    pub level: AccessLevel,
}

/// A generic query, or a continuation of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    /// Ordered select list.
    pub select: Vec<SelectColumn>,
    /// Ordered condition list.
    pub conditions: Vec<Condition>,
    /// Rows to skip before the first page.
    pub offset: u64,
    /// Page size; zero or negative closes a continuation.
    pub max_rows: i64,
    /// Nonzero to resume an open cursor.
    pub continuation: ContinuationToken,
    /// Whether the total row count is requested.
    pub total_count: bool,
    /// Optional per-row permission check.
    pub permission_check: Option<RowPermissionCheck>,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            select: Vec::new(),
            conditions: Vec::new(),
            offset: 0,
            max_rows: DEFAULT_MAX_ROWS,
            continuation: ContinuationToken::EXHAUSTED,
            total_count: false,
            permission_check: None,
        }
    }
}

impl QueryRequest {
    /// Continuation of an open cursor.
    pub fn continuation(token: ContinuationToken, max_rows: i64) -> Self {
        Self {
            continuation: token,
            max_rows,
            ..Self::default()
        }
    }

    /// Returns true when this request resumes a cursor rather than starting one.
    pub fn is_continuation(&self) -> bool {
        !self.continuation.is_exhausted()
    }
}
