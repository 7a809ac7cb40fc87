#![forbid(unsafe_code)]

//! Structured SQL clauses, rendered once after compilation.
//!
//! Predicates keep their bind values next to their SQL so that bind order is
//! always the order in which placeholders appear in the rendered text.

use crate::catalog::from_binding;

use super::condition::{Connective, Fragment};

/// FROM entries, deduplicated by the binding each entry introduces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FromList {
    entries: Vec<String>,
}

impl FromList {
    /// Adds `entry` unless an entry with the same binding is present.
    /// Bindings are compared as whole tokens, so `r_meta_main r_data_meta_main`
    /// and `r_meta_main` are distinct.
    pub fn add(&mut self, entry: &str) -> bool {
        if self.contains_binding(from_binding(entry)) {
            return false;
        }
        self.entries.push(entry.to_owned());
        true
    }

    /// Returns true when some entry binds `binding`.
    pub fn contains_binding(&self, binding: &str) -> bool {
        self.entries.iter().any(|e| from_binding(e) == binding)
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no entry was added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One AND-ed term of the WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhereNode {
    /// User condition or access filter.
    Predicate(Fragment),
    /// Two conditions on one column combined by a connective.
    Compound {
        /// OR / AND.
        connective: Connective,
        /// Left operand.
        left: Fragment,
        /// Right operand.
        right: Fragment,
    },
    /// Join predicate of a schema link or attribute instance; carries no binds.
    Join(String),
}

impl WhereNode {
    fn render_into(&self, sql: &mut String, binds: &mut Vec<String>) {
        match self {
            WhereNode::Predicate(frag) => {
                sql.push_str(&frag.sql);
                binds.extend(frag.binds.iter().cloned());
            }
            WhereNode::Compound {
                connective,
                left,
                right,
            } => {
                sql.push_str("( ");
                sql.push_str(&left.sql);
                sql.push(' ');
                sql.push_str(connective.sql());
                sql.push(' ');
                sql.push_str(&right.sql);
                sql.push_str(" )");
                binds.extend(left.binds.iter().cloned());
                binds.extend(right.binds.iter().cloned());
            }
            WhereNode::Join(predicate) => sql.push_str(predicate),
        }
    }
}

/// ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    /// Qualified column.
    pub column: String,
    /// Descending order.
    pub descending: bool,
}

/// All clauses of one generic query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlClauses {
    /// Select expressions.
    pub select: Vec<String>,
    /// FROM entries.
    pub from: FromList,
    /// WHERE terms, AND-ed in order.
    pub where_nodes: Vec<WhereNode>,
    /// GROUP BY columns.
    pub group_by: Vec<String>,
    /// ORDER BY entries.
    pub order_by: Vec<OrderItem>,
}

impl SqlClauses {
    /// Number of join predicates.
    pub fn join_count(&self) -> usize {
        self.where_nodes
            .iter()
            .filter(|n| matches!(n, WhereNode::Join(_)))
            .count()
    }

    /// Returns true when `column` is already ordered on.
    pub fn orders_on(&self, column: &str) -> bool {
        self.order_by.iter().any(|o| o.column == column)
    }

    fn render_where(&self, sql: &mut String, binds: &mut Vec<String>) {
        for (idx, node) in self.where_nodes.iter().enumerate() {
            sql.push_str(if idx == 0 { " where " } else { " AND " });
            node.render_into(sql, binds);
        }
    }

    fn render_body(&self, sql: &mut String, binds: &mut Vec<String>) {
        sql.push_str("select distinct ");
        sql.push_str(&self.select.join(", "));
        sql.push_str(" from ");
        sql.push_str(&self.from.entries().join(", "));
        self.render_where(sql, binds);
        if !self.group_by.is_empty() {
            sql.push_str(" group by ");
            sql.push_str(&self.group_by.join(", "));
        }
    }

    /// Renders the full statement. `pagination` is appended last.
    pub fn render(&self, pagination: Option<(String, Option<String>)>) -> Fragment {
        let mut sql = String::with_capacity(256);
        let mut binds = Vec::new();
        self.render_body(&mut sql, &mut binds);
        if !self.order_by.is_empty() {
            sql.push_str(" order by ");
            let items: Vec<String> = self
                .order_by
                .iter()
                .map(|o| {
                    if o.descending {
                        format!("{} desc", o.column)
                    } else {
                        o.column.clone()
                    }
                })
                .collect();
            sql.push_str(&items.join(", "));
        }
        if let Some((clause, bind)) = pagination {
            sql.push_str(&clause);
            binds.extend(bind);
        }
        Fragment { sql, binds }
    }

    /// Renders a statement counting the distinct rows of the query.
    pub fn render_count(&self) -> Fragment {
        let mut sql = String::from("select count(*) from (");
        let mut binds = Vec::new();
        self.render_body(&mut sql, &mut binds);
        sql.push_str(") genquery_count");
        Fragment { sql, binds }
    }
}
