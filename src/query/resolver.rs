#![forbid(unsafe_code)]

//! Spanning-tree join resolution.
//!
//! Starting from one required table, a depth-first walk over the schema graph
//! collects the links leading to every other required table. A link is kept
//! only when the subtree behind it contains a required table, so dead-end
//! exploration never leaks into the generated SQL.

use tracing::trace;

use crate::catalog::{SchemaGraph, TransientState, Visit};
use crate::types::{LinkId, QueryError, Result, TableId};

use super::clause::{SqlClauses, WhereNode};

/// Links connecting the required tables of one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinTree {
    /// Used links, each once.
    pub links: Vec<LinkId>,
}

/// Resolves a join tree covering every table marked required in `state`.
pub fn resolve(graph: &SchemaGraph, state: &mut TransientState) -> Result<JoinTree> {
    state.restart_traversal();
    let required = state.required_tables();
    let Some(start) = required
        .iter()
        .copied()
        .find(|t| !graph.table(*t).cycler)
        .or_else(|| required.first().copied())
    else {
        return Ok(JoinTree::default());
    };
    let mut links = Vec::new();
    scan(graph, state, start, None, &mut links);
    if state.pending() > 0 {
        let unreachable = state
            .unreached()
            .map(|t| graph.table(t).name.clone())
            .collect();
        return Err(QueryError::UnlinkedTables { unreachable });
    }
    if tracing::enabled!(tracing::Level::TRACE) {
        let tree: Vec<String> = links
            .iter()
            .map(|l| {
                let link = graph.link(*l);
                format!("{}-{}", letter(state, link.left), letter(state, link.right))
            })
            .collect();
        trace!(links = links.len(), tree = %tree.join(" "), "genquery.resolve.tree");
    }
    Ok(JoinTree { links })
}

fn letter(state: &TransientState, table: TableId) -> char {
    state.abbreviation(table).unwrap_or('.')
}

/// Returns true when the subtree rooted at `table` contains a required table.
fn scan(
    graph: &SchemaGraph,
    state: &mut TransientState,
    table: TableId,
    entry: Option<LinkId>,
    links: &mut Vec<LinkId>,
) -> bool {
    let mut contributed = false;
    if state.is_required(table) {
        state.found_required();
        contributed = true;
    }
    if graph.table(table).cycler {
        if contributed {
            state.mark(table, Visit::Found);
        }
        return contributed;
    }
    state.mark(table, Visit::Explored);
    for (link, other) in graph.incident_links(table) {
        if state.pending() == 0 {
            break;
        }
        if Some(link) == entry || state.visit(other) != Visit::Unseen {
            continue;
        }
        if scan(graph, state, other, Some(link), links) {
            links.push(link);
            contributed = true;
        }
    }
    contributed
}

impl JoinTree {
    /// Adds the required tables and every link endpoint to FROM, and each
    /// link predicate to WHERE.
    pub fn apply(&self, graph: &SchemaGraph, state: &TransientState, clauses: &mut SqlClauses) {
        for table in state.required_tables() {
            clauses.from.add(&graph.table(*table).alias);
        }
        for link in &self.links {
            let link = graph.link(*link);
            clauses.from.add(&graph.table(link.left).alias);
            clauses.from.add(&graph.table(link.right).alias);
            clauses
                .where_nodes
                .push(WhereNode::Join(link.predicate.clone()));
        }
    }
}
