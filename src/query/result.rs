#![forbid(unsafe_code)]

//! Result pages stored as one fixed-width buffer per column.
//!
//! Each value occupies a slot of the column's current width, with its byte
//! length kept alongside so values may hold any byte, NUL included. When a
//! value does not fit, the column grows to the needed width plus
//! headroom and the rows already stored are re-laid out into the new buffer.

use serde::{Deserialize, Serialize};

use crate::types::{BackendError, ColumnId, QueryError, Result};

/// Buffer sizing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultSettings {
    /// Smallest slot width, terminator included.
    pub min_column_width: usize,
    /// Extra bytes added whenever a column has to grow.
    pub column_headroom: usize,
    /// Cap on the bytes held by one page; exceeding it is a resource error.
    pub max_result_bytes: Option<usize>,
}

impl Default for ResultSettings {
    fn default() -> Self {
        Self {
            min_column_width: 50,
            column_headroom: 50,
            max_result_bytes: None,
        }
    }
}

#[derive(Debug, Clone)]
struct ColumnBuffer {
    column: ColumnId,
    width: usize,
    data: Vec<u8>,
    lengths: Vec<usize>,
}

/// One page of rows.
#[derive(Debug, Clone)]
pub struct ResultTable {
    columns: Vec<ColumnBuffer>,
    rows: usize,
    settings: ResultSettings,
}

impl ResultTable {
    /// Creates an empty page for the given select columns.
    pub fn new(columns: impl IntoIterator<Item = ColumnId>, settings: ResultSettings) -> Self {
        Self {
            columns: columns
                .into_iter()
                .map(|column| ColumnBuffer {
                    column,
                    width: 0,
                    data: Vec::new(),
                    lengths: Vec::new(),
                })
                .collect(),
            rows: 0,
            settings,
        }
    }

    /// Appends one row, growing column buffers as needed.
    pub fn push_row(&mut self, row: &[String]) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(QueryError::Backend(BackendError::Message(format!(
                "row has {} values, expected {}",
                row.len(),
                self.columns.len()
            ))));
        }
        for (idx, value) in row.iter().enumerate() {
            let needed = value.len() + 1;
            let current = self.columns[idx].width;
            if needed > current {
                let width = if current == 0 {
                    needed.max(self.settings.min_column_width)
                } else {
                    needed + self.settings.column_headroom
                };
                self.regrow(idx, width)?;
            }
        }
        self.check_cap(self.rows + 1)?;
        for (buffer, value) in self.columns.iter_mut().zip(row) {
            let start = buffer.data.len();
            try_grow(&mut buffer.data, buffer.width)?;
            buffer.data[start..start + value.len()].copy_from_slice(value.as_bytes());
            buffer.lengths.push(value.len());
        }
        self.rows += 1;
        Ok(())
    }

    fn regrow(&mut self, idx: usize, width: usize) -> Result<()> {
        let rows = self.rows;
        let old_width = self.columns[idx].width;
        let mut data = Vec::new();
        data.try_reserve_exact(width.saturating_mul(rows + 1))
            .map_err(|err| QueryError::Resource {
                reason: err.to_string(),
            })?;
        let old = &self.columns[idx].data;
        for row in 0..rows {
            let slot = &old[row * old_width..(row + 1) * old_width];
            data.extend_from_slice(slot);
            data.resize((row + 1) * width, 0);
        }
        let buffer = &mut self.columns[idx];
        buffer.width = width;
        buffer.data = data;
        tracing::trace!(column = %buffer.column, width, rows, "genquery.result.regrow");
        Ok(())
    }

    fn check_cap(&self, rows: usize) -> Result<()> {
        let Some(max) = self.settings.max_result_bytes else {
            return Ok(());
        };
        let row_width: usize = self.columns.iter().map(|c| c.width).sum();
        let total = row_width.saturating_mul(rows);
        if total > max {
            return Err(QueryError::Resource {
                reason: format!("page needs {total} bytes, cap is {max}"),
            });
        }
        Ok(())
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns true when the page holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Select column ids in order.
    pub fn column_ids(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.columns.iter().map(|c| c.column)
    }

    /// Current slot width of a column.
    pub fn width(&self, column: usize) -> Option<usize> {
        self.columns.get(column).map(|c| c.width)
    }

    /// Value at `row`, `column`.
    pub fn value(&self, row: usize, column: usize) -> Option<&str> {
        if row >= self.rows {
            return None;
        }
        let buffer = self.columns.get(column)?;
        let start = row * buffer.width;
        let len = *buffer.lengths.get(row)?;
        std::str::from_utf8(&buffer.data[start..start + len]).ok()
    }

    /// Iterates rows as vectors of borrowed values.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&str>> + '_ {
        (0..self.rows).map(move |row| {
            (0..self.columns.len())
                .map(|col| self.value(row, col).unwrap_or(""))
                .collect()
        })
    }

    /// Copies every row out of the page.
    pub fn to_rows(&self) -> Vec<Vec<String>> {
        self.rows()
            .map(|row| row.into_iter().map(str::to_owned).collect())
            .collect()
    }
}

fn try_grow(data: &mut Vec<u8>, extra: usize) -> Result<()> {
    data.try_reserve(extra).map_err(|err| QueryError::Resource {
        reason: err.to_string(),
    })?;
    data.resize(data.len() + extra, 0);
    Ok(())
}
