#![forbid(unsafe_code)]

//! Capability description of a relational dialect.
//!
//! The compiler and executor never branch on a dialect name; they consult the
//! capabilities carried here.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a nonzero offset is expressed in SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationSyntax {
    /// ` offset ?` with the offset bound as the last parameter.
    OffsetBind,
    /// ` limit <offset>,<unbounded>` with the offset inlined.
    LimitComma,
    /// No SQL clause; the backend skips rows itself.
    Manual,
}

/// Dialect capabilities injected into the compiler and executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialect {
    /// Preset name, for diagnostics.
    pub name: String,
    /// Spelling of the string length function used by `begin_of`.
    pub length_function: String,
    /// Offset syntax.
    pub pagination: PaginationSyntax,
    /// Row limit literal meaning "no limit" for [`PaginationSyntax::LimitComma`].
    pub unbounded_limit: String,
    /// Whether the total count is computed by an up-front count query.
    pub count_query: bool,
}

impl Dialect {
    /// PostgreSQL: `offset ?`, counts derived from the scan.
    pub fn postgres() -> Self {
        Self {
            name: "postgres".into(),
            length_function: "char_length".into(),
            pagination: PaginationSyntax::OffsetBind,
            unbounded_limit: String::new(),
            count_query: false,
        }
    }

    /// MySQL: `limit offset,18446744073709551615`.
    pub fn mysql() -> Self {
        Self {
            name: "mysql".into(),
            length_function: "char_length".into(),
            pagination: PaginationSyntax::LimitComma,
            unbounded_limit: "18446744073709551615".into(),
            count_query: false,
        }
    }

    /// Oracle: rows are skipped manually and counts come from a count query.
    pub fn oracle() -> Self {
        Self {
            name: "oracle".into(),
            length_function: "length".into(),
            pagination: PaginationSyntax::Manual,
            unbounded_limit: String::new(),
            count_query: true,
        }
    }

    /// SQLite: `limit offset,-1`.
    pub fn sqlite() -> Self {
        Self {
            name: "sqlite".into(),
            length_function: "length".into(),
            pagination: PaginationSyntax::LimitComma,
            unbounded_limit: "-1".into(),
            count_query: false,
        }
    }

    /// Looks up a preset by name (case-insensitive).
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::postgres()),
            "mysql" => Some(Self::mysql()),
            "oracle" => Some(Self::oracle()),
            "sqlite" => Some(Self::sqlite()),
            _ => None,
        }
    }

    /// Pagination suffix for `offset`, plus the bind value it consumes.
    /// A zero offset never adds a clause.
    pub fn pagination_clause(&self, offset: u64) -> Option<(String, Option<String>)> {
        if offset == 0 {
            return None;
        }
        match self.pagination {
            PaginationSyntax::OffsetBind => Some((" offset ?".to_owned(), Some(offset.to_string()))),
            PaginationSyntax::LimitComma => Some((
                format!(" limit {offset},{}", self.unbounded_limit),
                None,
            )),
            PaginationSyntax::Manual => None,
        }
    }

    /// Rows the backend must discard before the first delivered row.
    pub fn skip_rows(&self, offset: u64) -> u64 {
        match self.pagination {
            PaginationSyntax::Manual => offset,
            _ => 0,
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::postgres()
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
