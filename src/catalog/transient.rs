#![forbid(unsafe_code)]

use crate::types::TableId;

/// Traversal mark of a table during one join resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visit {
    Unseen,
    /// Required cycler reached; never explored further.
    Found,
    /// Fully explored.
    Explored,
}

/// Per-compilation bookkeeping over the tables of a schema graph.
///
/// Each compilation owns one of these, so concurrent compilations never share
/// visited flags or abbreviation counters.
#[derive(Debug, Clone)]
pub struct TransientState {
    visits: Vec<Visit>,
    required: Vec<bool>,
    required_order: Vec<TableId>,
    abbreviations: Vec<Option<char>>,
    next_abbreviation: u8,
    pending: usize,
}

impl TransientState {
    pub(crate) fn new(tables: usize) -> Self {
        Self {
            visits: vec![Visit::Unseen; tables],
            required: vec![false; tables],
            required_order: Vec::new(),
            abbreviations: vec![None; tables],
            next_abbreviation: b'a',
            pending: 0,
        }
    }

    /// Clears visited marks, required flags and abbreviations.
    pub fn reset(&mut self) {
        self.visits.fill(Visit::Unseen);
        self.required.fill(false);
        self.required_order.clear();
        self.abbreviations.fill(None);
        self.next_abbreviation = b'a';
        self.pending = 0;
    }

    /// Marks `table` as required. Returns true the first time.
    pub fn require(&mut self, table: TableId) -> bool {
        if self.required[table.0] {
            return false;
        }
        self.required[table.0] = true;
        self.required_order.push(table);
        self.pending += 1;
        self.abbreviations[table.0] = Some(self.next_abbreviation as char);
        // Past 'z' the letters wrap into the uppercase range.
        self.next_abbreviation = match self.next_abbreviation {
            b'z' => b'A',
            b'Z' => b'a',
            other => other + 1,
        };
        true
    }

    /// Returns true when `table` must be part of the join tree.
    pub fn is_required(&self, table: TableId) -> bool {
        self.required[table.0]
    }

    /// Required tables in the order they were first referenced.
    pub fn required_tables(&self) -> &[TableId] {
        &self.required_order
    }

    /// Required tables not yet reached by the traversal.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Short letter assigned when the table was first required.
    pub fn abbreviation(&self, table: TableId) -> Option<char> {
        self.abbreviations[table.0]
    }

    pub(crate) fn visit(&self, table: TableId) -> Visit {
        self.visits[table.0]
    }

    pub(crate) fn mark(&mut self, table: TableId, visit: Visit) {
        self.visits[table.0] = visit;
    }

    pub(crate) fn found_required(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }

    /// Clears traversal marks and restores the pending count, keeping the
    /// required set. Used before re-running a traversal.
    pub(crate) fn restart_traversal(&mut self) {
        self.visits.fill(Visit::Unseen);
        self.pending = self.required_order.len();
    }

    /// Required tables the last traversal failed to reach.
    pub(crate) fn unreached(&self) -> impl Iterator<Item = TableId> + '_ {
        self.required_order
            .iter()
            .copied()
            .filter(|t| self.visits[t.0] == Visit::Unseen)
    }
}
