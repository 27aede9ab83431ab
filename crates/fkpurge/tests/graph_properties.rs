//! Property tests for dependency graph traversal over random schemas.

use fkpurge::domain::SchemaSnapshot;
use fkpurge::graph::DependencyGraph;
use proptest::prelude::*;
use std::collections::HashSet;

fn table(i: usize) -> String {
    format!("t{i}")
}

/// `(table count, (dependent, referenced) pairs)`; may contain cycles and
/// self-references.
fn any_schema() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..10).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..25)))
}

/// Like [`any_schema`] but a table only ever references a lower-numbered one.
fn acyclic_schema() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    any_schema().prop_map(|(n, edges)| {
        let edges = edges
            .into_iter()
            .filter(|(a, b)| a != b)
            .map(|(a, b)| (a.max(b), a.min(b)))
            .collect();
        (n, edges)
    })
}

fn build(n: usize, edges: &[(usize, usize)]) -> DependencyGraph {
    let mut snapshot = SchemaSnapshot::new();
    for i in 0..n {
        snapshot = snapshot.table(table(i));
    }
    for &(dependent, referenced) in edges {
        snapshot = snapshot.foreign_key(table(dependent), table(referenced));
    }
    DependencyGraph::build(&snapshot).unwrap()
}

fn position(order: &[String], name: &str) -> usize {
    order.iter().position(|t| t == name).unwrap()
}

proptest! {
    #[test]
    fn traversal_emits_every_table_once((n, edges) in any_schema()) {
        let graph = build(n, &edges);
        let order: Vec<String> = graph
            .purge_order()
            .into_iter()
            .map(|t| t.as_str().to_string())
            .collect();

        prop_assert_eq!(order.len(), n);
        let distinct: HashSet<&String> = order.iter().collect();
        prop_assert_eq!(distinct.len(), n);
    }

    #[test]
    fn acyclic_traversal_is_post_order((n, edges) in acyclic_schema()) {
        let graph = build(n, &edges);
        let order: Vec<String> = graph
            .purge_order()
            .into_iter()
            .map(|t| t.as_str().to_string())
            .collect();

        for &(dependent, referenced) in &edges {
            prop_assert!(
                position(&order, &table(dependent)) < position(&order, &table(referenced)),
                "{} must be purged before {}", table(dependent), table(referenced)
            );
        }
    }

    #[test]
    fn closure_excludes_start_and_has_no_duplicates((n, edges) in any_schema(), start in 0usize..10) {
        let graph = build(n, &edges);
        let name = table(start % n);
        let vertex = graph.find_anywhere(&name).unwrap();
        let closure = graph.dependent_closure(vertex);

        prop_assert!(closure.iter().all(|v| v.name().as_str() != name));
        let distinct: HashSet<&str> = closure.iter().map(|v| v.name().as_str()).collect();
        prop_assert_eq!(distinct.len(), closure.len());
    }

    #[test]
    fn acyclic_closure_is_delete_safe((n, edges) in acyclic_schema(), start in 0usize..10) {
        let graph = build(n, &edges);
        let vertex = graph.find_anywhere(&table(start % n)).unwrap();
        let closure: Vec<String> = graph
            .dependent_closure(vertex)
            .iter()
            .map(|v| v.name().as_str().to_string())
            .collect();

        for &(dependent, referenced) in &edges {
            let referenced = table(referenced);
            if closure.contains(&referenced) {
                prop_assert!(
                    position(&closure, &table(dependent)) < position(&closure, &referenced)
                );
            }
        }
    }
}
