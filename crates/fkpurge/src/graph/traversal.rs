//! Depth-first walks over the dependency graph.

use super::{DependencyGraph, Vertex};
use crate::domain::TableKey;
use petgraph::graph::NodeIndex;
use std::collections::HashSet;

/// Post-order walk from the root, emitting every reachable table once.
///
/// `visited` is keyed by table name. `on_stack` tracks the current DFS path so
/// a back-edge (cycle) can be told apart from a second path into an already
/// finished subtree (diamond).
pub(super) fn post_order<F>(graph: &DependencyGraph, mut visit: F)
where
    F: FnMut(Vertex<'_>),
{
    let mut visited: HashSet<TableKey> = HashSet::new();
    let mut on_stack: HashSet<NodeIndex> = HashSet::new();
    walk(graph, graph.root, &mut visited, &mut on_stack, &mut visit);
}

fn walk<F>(
    graph: &DependencyGraph,
    node: NodeIndex,
    visited: &mut HashSet<TableKey>,
    on_stack: &mut HashSet<NodeIndex>,
    visit: &mut F,
) where
    F: FnMut(Vertex<'_>),
{
    on_stack.insert(node);

    for dependent in graph.dependent_indices(node) {
        let name = &graph.graph[dependent];

        if visited.insert(name.key()) {
            walk(graph, dependent, visited, on_stack, visit);
        } else if dependent == node {
            tracing::debug!(table = %name, "Skipping self-reference");
        } else if on_stack.contains(&dependent) {
            tracing::warn!(
                table = %name,
                from = %graph.graph[node],
                "Cycle detected; not descending into table again"
            );
        } else {
            tracing::trace!(table = %name, "Already visited");
        }
    }

    on_stack.remove(&node);

    if node != graph.root {
        visit(graph.vertex(node));
    }
}

/// Transitive dependents of `start` in post-order, excluding `start` itself.
///
/// Visited is keyed by node identity and a node is marked before its
/// dependents are explored, which is what stops recursion on cycles.
pub(super) fn dependent_closure(graph: &DependencyGraph, start: NodeIndex) -> Vec<NodeIndex> {
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut closure: Vec<NodeIndex> = Vec::new();
    collect(graph, start, &mut visited, &mut closure);

    closure.retain(|&index| index != start);
    closure
}

fn collect(
    graph: &DependencyGraph,
    node: NodeIndex,
    visited: &mut HashSet<NodeIndex>,
    closure: &mut Vec<NodeIndex>,
) {
    if !visited.insert(node) {
        return;
    }

    for dependent in graph.dependent_indices(node) {
        collect(graph, dependent, visited, closure);
    }

    closure.push(node);
}
