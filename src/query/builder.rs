//! Fluent construction of generic query requests.

use crate::types::{ColumnId, QueryError, Result};

use super::request::{
    AccessLevel, Aggregation, Condition, OrderBy, QueryRequest, RowPermissionCheck, SelectColumn,
};

/// Fluent builder for [`QueryRequest`].
///
/// Errors are latched: the first misuse is kept and reported by
/// [`QueryBuilder::build`], later calls become no-ops.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    request: QueryRequest,
    error: Option<QueryError>,
}

impl QueryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plain select column.
    pub fn select(self, column: impl Into<ColumnId>) -> Self {
        self.select_with(column, Aggregation::None, OrderBy::None)
    }

    /// Adds an aggregated select column.
    pub fn aggregate(self, column: impl Into<ColumnId>, aggregate: Aggregation) -> Self {
        self.select_with(column, aggregate, OrderBy::None)
    }

    /// Adds a select column with every option spelled out.
    pub fn select_with(
        mut self,
        column: impl Into<ColumnId>,
        aggregate: Aggregation,
        order: OrderBy,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        self.request.select.push(SelectColumn {
            column: column.into(),
            aggregate,
            order,
        });
        self
    }

    /// Orders ascending by a column already in the select list.
    pub fn order_by(self, column: impl Into<ColumnId>) -> Self {
        self.set_order(column.into(), OrderBy::Asc)
    }

    /// Orders descending by a column already in the select list.
    pub fn order_by_desc(self, column: impl Into<ColumnId>) -> Self {
        self.set_order(column.into(), OrderBy::Desc)
    }

    fn set_order(mut self, column: ColumnId, order: OrderBy) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.request.select.iter_mut().find(|s| s.column == column) {
            Some(select) => select.order = order,
            None => {
                self.error = Some(QueryError::InvalidRequest {
                    reason: "order_by requires a selected column",
                })
            }
        }
        self
    }

    /// Adds a raw condition expression such as `like 'a%'`.
    pub fn condition(mut self, column: impl Into<ColumnId>, expression: impl Into<String>) -> Self {
        if self.error.is_some() {
            return self;
        }
        self.request.conditions.push(Condition {
            column: column.into(),
            expression: expression.into(),
        });
        self
    }

    /// Adds `= 'value'`.
    pub fn equals(self, column: impl Into<ColumnId>, value: &str) -> Self {
        self.condition(column, format!("= '{value}'"))
    }

    /// Adds `begin_of 'prefix'`.
    pub fn begins_with(self, column: impl Into<ColumnId>, prefix: &str) -> Self {
        self.condition(column, format!("begin_of '{prefix}'"))
    }

    /// Rows to skip.
    pub fn offset(mut self, offset: u64) -> Self {
        self.request.offset = offset;
        self
    }

    /// Page size.
    pub fn max_rows(mut self, max_rows: i64) -> Self {
        self.request.max_rows = max_rows;
        self
    }

    /// Requests the total row count.
    pub fn total_count(mut self, enabled: bool) -> Self {
        self.request.total_count = enabled;
        self
    }

    /// Requires `level` on every returned object for `user` of `zone`.
    pub fn check_permission(
        mut self,
        user: impl Into<String>,
        zone: impl Into<String>,
        level: AccessLevel,
    ) -> Self {
        self.request.permission_check = Some(RowPermissionCheck {
            user: user.into(),
            zone: zone.into(),
            level,
        });
        self
    }

    /// Finishes the request.
    pub fn build(self) -> Result<QueryRequest> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.request.select.is_empty() {
            return Err(QueryError::InvalidRequest {
                reason: "select list is empty",
            });
        }
        Ok(self.request)
    }
}
