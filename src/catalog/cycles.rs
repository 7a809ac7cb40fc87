#![forbid(unsafe_code)]

//! Cycle validation for the non-cycler part of a schema graph.
//!
//! The join resolver relies on there being at most one path between any two
//! non-cycler tables. This check is run when a schema is loaded or replaced,
//! never while serving queries.

use crate::types::{LinkId, TableId};

use super::SchemaGraph;

/// Location at which a cycle was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Table reached a second time.
    pub table: TableId,
    /// Link that reached it.
    pub link: LinkId,
}

/// Searches every connected component of the non-cycler subgraph for a cycle.
///
/// Each component is stamped with its own id during a depth-first walk;
/// reaching a table already carrying the current stamp through any link other
/// than the one just used to enter it closes a cycle. Parallel links between
/// the same two tables therefore count as a cycle.
pub fn find_cycle(graph: &SchemaGraph) -> Option<CycleReport> {
    let mut stamps = vec![0usize; graph.tables().len()];
    let mut component = 0usize;
    for (idx, table) in graph.tables().iter().enumerate() {
        if table.cycler || stamps[idx] != 0 {
            continue;
        }
        component += 1;
        if let Some(report) = walk(graph, TableId(idx), None, component, &mut stamps) {
            return Some(report);
        }
    }
    None
}

fn walk(
    graph: &SchemaGraph,
    table: TableId,
    entry: Option<LinkId>,
    component: usize,
    stamps: &mut [usize],
) -> Option<CycleReport> {
    stamps[table.0] = component;
    for (link, other) in graph.incident_links(table) {
        if Some(link) == entry || graph.table(other).cycler {
            continue;
        }
        if stamps[other.0] == component {
            return Some(CycleReport { table: other, link });
        }
        if let Some(report) = walk(graph, other, Some(link), component, stamps) {
            return Some(report);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(names: &[&str], cyclers: &[&str]) -> SchemaGraph {
        let mut graph = SchemaGraph::new();
        for name in names {
            graph
                .register_table(name, "", cyclers.contains(name))
                .unwrap();
        }
        for pair in names.windows(2) {
            graph
                .register_link(pair[0], pair[1], &format!("{}.id = {}.id", pair[0], pair[1]))
                .unwrap();
        }
        graph
    }

    #[test]
    fn forest_has_no_cycle() {
        let mut graph = chain(&["a", "b", "c"], &[]);
        graph.register_table("x", "", false).unwrap();
        graph.register_table("y", "", false).unwrap();
        graph.register_link("x", "y", "x.id = y.id").unwrap();
        assert_eq!(find_cycle(&graph), None);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn redundant_edge_is_reported() {
        let mut graph = chain(&["a", "b", "c"], &[]);
        let link = graph.register_link("c", "a", "c.id = a.id").unwrap();
        let report = find_cycle(&graph).expect("cycle");
        assert_eq!(report.link, link);
        assert!(graph.validate().is_err());
    }

    #[test]
    fn parallel_links_form_a_cycle() {
        let mut graph = chain(&["a", "b"], &[]);
        graph.register_link("a", "b", "a.other = b.other").unwrap();
        assert!(find_cycle(&graph).is_some());
    }

    #[test]
    fn cycles_through_cyclers_are_ignored() {
        let mut graph = chain(&["a", "hub", "b"], &["hub"]);
        graph.register_link("a", "hub", "a.z = hub.z").unwrap();
        graph.register_link("hub", "b", "hub.z = b.z").unwrap();
        assert_eq!(find_cycle(&graph), None);
    }
}
