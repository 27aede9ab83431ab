//! Foreign-key dependency graph.
//!
//! The graph is built once from a [`SchemaSnapshot`] and is immutable
//! afterward, so it can be shared between concurrent purges behind an `Arc`.
//!
//! # Edge Direction Convention
//!
//! Edges point from a **referenced** table to the tables that **reference**
//! it (its dependents):
//!
//! - `orders.customer_id -> customers.id` produces the edge `customers -> orders`
//! - `order_lines.order_id -> orders.id` produces the edge `orders -> order_lines`
//!
//! Deleting rows of a vertex therefore requires first deleting the rows of
//! everything reachable from it.
//!
//! # Root
//!
//! A synthetic `Root` vertex sits above the schema. Its dependents are every
//! table with no incoming edge (self-references do not count). Tables that
//! only participate in cycles would otherwise be unreachable, so the first
//! table of each such group (in declaration order) is attached to the root as
//! well. Every table is thus reachable from the root.
//!
//! The root never collides with a real table called `Root`: it is kept out of
//! the name index and is never emitted by traversal.

mod traversal;

use crate::domain::{SchemaSnapshot, TableKey, TableName};
use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Display name of the synthetic root vertex.
pub const ROOT_NAME: &str = "Root";

/// Which vertices [`DependencyGraph::lookup`] may return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryPointScope {
    /// Only direct children of the root (tables nothing else references)
    #[default]
    TopLevel,

    /// Any table in the graph
    AnyTable,
}

/// Immutable graph of foreign-key dependencies between tables.
pub struct DependencyGraph {
    /// Nodes hold table names; an edge `a -> b` means `b` references `a`.
    graph: DiGraph<TableName, ()>,

    /// The synthetic root node.
    root: NodeIndex,

    /// Case-folded table name to node.
    node_map: HashMap<TableKey, NodeIndex>,
}

impl fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("tables", &self.node_map.len())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}

/// A vertex of a [`DependencyGraph`], borrowed from the graph.
#[derive(Clone, Copy)]
pub struct Vertex<'g> {
    graph: &'g DependencyGraph,
    index: NodeIndex,
}

impl<'g> Vertex<'g> {
    /// The table name (or [`ROOT_NAME`] for the root).
    pub fn name(&self) -> &'g TableName {
        &self.graph.graph[self.index]
    }

    /// Whether this is the synthetic root.
    pub fn is_root(&self) -> bool {
        self.index == self.graph.root
    }

    /// Stable identity of this vertex within its graph.
    pub fn index(&self) -> NodeIndex {
        self.index
    }

    /// Vertices that directly reference this one, in declaration order.
    pub fn dependents(&self) -> impl Iterator<Item = Vertex<'g>> + use<'g> {
        let graph = self.graph;
        graph
            .dependent_indices(self.index)
            .into_iter()
            .map(move |index| Vertex { graph, index })
    }

    /// Whether this vertex references itself.
    pub fn is_self_referencing(&self) -> bool {
        self.graph.graph.contains_edge(self.index, self.index)
    }
}

impl PartialEq for Vertex<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.graph, other.graph) && self.index == other.index
    }
}

impl Eq for Vertex<'_> {}

impl fmt::Debug for Vertex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vertex")
            .field("name", self.name())
            .field("index", &self.index.index())
            .finish()
    }
}

impl DependencyGraph {
    /// Build the graph from a schema snapshot.
    ///
    /// Creates one vertex per distinct table (names compare case-insensitively)
    /// and one edge per distinct foreign key. If `snapshot.tables` is empty the
    /// table set is taken from the foreign keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a foreign key names a table that is
    /// not in `snapshot.tables`.
    pub fn build(snapshot: &SchemaSnapshot) -> Result<Self> {
        let mut graph = DiGraph::new();
        let root = graph.add_node(TableName::new(ROOT_NAME));
        let mut node_map: HashMap<TableKey, NodeIndex> = HashMap::new();
        let mut declared: Vec<NodeIndex> = Vec::new();

        let derive_tables = snapshot.tables.is_empty();
        let implied = snapshot
            .foreign_keys
            .iter()
            .flat_map(|fk| [&fk.references, &fk.table])
            .filter(|_| derive_tables);

        for table in snapshot.tables.iter().chain(implied) {
            if node_map.contains_key(&table.key()) {
                continue;
            }
            let index = graph.add_node(table.clone());
            node_map.insert(table.key(), index);
            declared.push(index);
        }

        for fk in &snapshot.foreign_keys {
            let resolve = |name: &TableName| {
                node_map.get(&name.key()).copied().ok_or_else(|| {
                    Error::Configuration(format!(
                        "foreign key {} -> {} names unknown table '{}'",
                        fk.table, fk.references, name
                    ))
                })
            };
            let referenced = resolve(&fk.references)?;
            let dependent = resolve(&fk.table)?;

            if !graph.contains_edge(referenced, dependent) {
                graph.add_edge(referenced, dependent, ());
            }
        }

        // Tables with no incoming edge hang off the root
        let mut top_level: Vec<NodeIndex> = declared
            .iter()
            .copied()
            .filter(|&index| {
                graph
                    .edges_directed(index, Direction::Incoming)
                    .all(|edge| edge.source() == index)
            })
            .collect();

        // Attach one entry per cycle-only group so everything stays reachable
        let mut reachable: HashSet<NodeIndex> = HashSet::new();
        let mark_reachable = |start: NodeIndex, reachable: &mut HashSet<NodeIndex>| {
            let mut dfs = Dfs::new(&graph, start);
            while let Some(node) = dfs.next(&graph) {
                reachable.insert(node);
            }
        };
        for &index in &top_level {
            mark_reachable(index, &mut reachable);
        }
        for &index in &declared {
            if !reachable.contains(&index) {
                tracing::debug!(table = %graph[index], "Attaching cycle-only table to root");
                top_level.push(index);
                mark_reachable(index, &mut reachable);
            }
        }

        for index in top_level {
            graph.add_edge(root, index, ());
        }

        tracing::debug!(
            tables = node_map.len(),
            foreign_keys = graph.edge_count() - graph.neighbors(root).count(),
            "Built dependency graph"
        );

        Ok(Self {
            graph,
            root,
            node_map,
        })
    }

    /// The synthetic root vertex.
    pub fn root(&self) -> Vertex<'_> {
        self.vertex(self.root)
    }

    /// Number of real tables (the root is not counted).
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Whether the graph has no tables.
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    /// All tables in declaration order.
    pub fn tables(&self) -> impl Iterator<Item = Vertex<'_>> {
        self.graph
            .node_indices()
            .filter(move |&index| index != self.root)
            .map(move |index| self.vertex(index))
    }

    /// Case-insensitive lookup among the root's direct children.
    ///
    /// Only top-level tables (nothing references them) are found; use
    /// [`DependencyGraph::lookup`] with [`EntryPointScope::AnyTable`] to search
    /// the whole graph.
    pub fn find_by_name(&self, name: &str) -> Option<Vertex<'_>> {
        self.root().dependents().find(|v| v.name().as_str().eq_ignore_ascii_case(name))
    }

    /// Case-insensitive lookup over the whole graph.
    pub fn find_anywhere(&self, name: &str) -> Option<Vertex<'_>> {
        self.node_map
            .get(name.to_ascii_lowercase().as_str())
            .map(|&index| self.vertex(index))
    }

    /// Look up a purge entry point under the given scope.
    pub fn lookup(&self, name: &str, scope: EntryPointScope) -> Option<Vertex<'_>> {
        match scope {
            EntryPointScope::TopLevel => self.find_by_name(name),
            EntryPointScope::AnyTable => self.find_anywhere(name),
        }
    }

    /// Direct dependents of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VertexNotFound`] if `name` is not a table of the graph.
    pub fn dependents_of(&self, name: &str) -> Result<Vec<&TableName>> {
        let vertex = self
            .find_anywhere(name)
            .ok_or_else(|| Error::VertexNotFound(TableName::new(name)))?;
        Ok(vertex.dependents().map(|v| v.name()).collect())
    }

    /// Depth-first walk from the root.
    ///
    /// Each table is emitted once, after all of its dependents' subtrees
    /// (post-order). A visited set keyed by table name dedupes diamonds and
    /// breaks cycles; a cycle back-edge is logged and not followed. The root
    /// itself is never emitted.
    pub fn traverse<F>(&self, visit: F)
    where
        F: FnMut(Vertex<'_>),
    {
        traversal::post_order(self, visit);
    }

    /// Every table in traversal order: deepest dependents first.
    pub fn purge_order(&self) -> Vec<TableName> {
        let mut order = Vec::with_capacity(self.len());
        self.traverse(|vertex| order.push(vertex.name().clone()));
        order
    }

    /// Transitive dependents of `vertex`, deepest first, excluding `vertex`.
    ///
    /// Cycle-safe: a vertex is marked visited before its dependents are
    /// explored and added after them, so the result is a post-order where no
    /// table appears before anything that depends on it (cycles aside).
    pub fn dependent_closure<'g>(&'g self, vertex: Vertex<'g>) -> Vec<Vertex<'g>> {
        traversal::dependent_closure(self, vertex.index)
            .into_iter()
            .map(|index| self.vertex(index))
            .collect()
    }

    fn vertex(&self, index: NodeIndex) -> Vertex<'_> {
        Vertex { graph: self, index }
    }

    /// Dependents of `index` in the order their edges were added.
    fn dependent_indices(&self, index: NodeIndex) -> Vec<NodeIndex> {
        // petgraph yields the most recently added edge first
        let mut dependents: Vec<NodeIndex> = self.graph.neighbors(index).collect();
        dependents.reverse();
        dependents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(vertices: &[Vertex<'_>]) -> Vec<String> {
        vertices.iter().map(|v| v.name().to_string()).collect()
    }

    fn chain() -> DependencyGraph {
        // customers <- orders <- order_lines
        DependencyGraph::build(
            &SchemaSnapshot::new()
                .table("Customers")
                .table("Orders")
                .table("OrderLines")
                .foreign_key("Orders", "Customers")
                .foreign_key("OrderLines", "Orders"),
        )
        .unwrap()
    }

    #[test]
    fn test_root_children_are_unreferenced_tables() {
        let graph = chain();
        let top: Vec<_> = graph.root().dependents().collect();
        assert_eq!(names(&top), vec!["Customers"]);
        assert!(graph.root().is_root());
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_find_by_name_is_case_insensitive() {
        let graph = chain();
        let a = graph.find_by_name("customers").unwrap();
        let b = graph.find_by_name("CUSTOMERS").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name().as_str(), "Customers");
    }

    #[test]
    fn test_find_by_name_only_searches_top_level() {
        let graph = chain();
        assert!(graph.find_by_name("Orders").is_none());
        assert!(graph.find_anywhere("orders").is_some());
        assert!(graph.lookup("orders", EntryPointScope::AnyTable).is_some());
        assert!(graph.lookup("orders", EntryPointScope::TopLevel).is_none());
    }

    #[test]
    fn test_unknown_table_in_foreign_key_is_configuration_error() {
        let result = DependencyGraph::build(
            &SchemaSnapshot::new()
                .table("orders")
                .foreign_key("orders", "customers"),
        );
        match result {
            Err(Error::Configuration(message)) => assert!(message.contains("customers")),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_tables_derived_from_foreign_keys_when_not_listed() {
        let graph = DependencyGraph::build(
            &SchemaSnapshot::new()
                .foreign_key("orders", "customers")
                .foreign_key("invoices", "orders"),
        )
        .unwrap();
        assert_eq!(graph.len(), 3);
        assert!(graph.find_by_name("customers").is_some());
    }

    #[test]
    fn test_isolated_tables_are_top_level() {
        let graph = DependencyGraph::build(
            &SchemaSnapshot::new()
                .table("audit_log")
                .table("customers")
                .table("orders")
                .foreign_key("orders", "customers"),
        )
        .unwrap();
        assert!(graph.find_by_name("audit_log").is_some());
        assert_eq!(graph.dependents_of("audit_log").unwrap().len(), 0);
    }

    #[test]
    fn test_duplicate_edges_and_tables_collapse() {
        let graph = DependencyGraph::build(
            &SchemaSnapshot::new()
                .table("a")
                .table("A")
                .table("b")
                .foreign_key("b", "a")
                .foreign_key("B", "a"),
        )
        .unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.dependents_of("a").unwrap().len(), 1);
    }

    #[test]
    fn test_self_reference_is_tolerated() {
        let graph = DependencyGraph::build(
            &SchemaSnapshot::new()
                .table("employees")
                .foreign_key("employees", "employees"),
        )
        .unwrap();
        let employees = graph.find_by_name("employees").unwrap();
        assert!(employees.is_self_referencing());
        assert_eq!(graph.purge_order(), vec![TableName::new("employees")]);
    }

    #[test]
    fn test_pure_cycle_stays_reachable() {
        let graph = DependencyGraph::build(
            &SchemaSnapshot::new()
                .table("a")
                .table("b")
                .foreign_key("a", "b")
                .foreign_key("b", "a"),
        )
        .unwrap();
        let order = graph.purge_order();
        assert_eq!(order.len(), 2);
        assert!(graph.find_by_name("a").is_some());
        assert!(graph.find_by_name("b").is_none());
    }

    #[test]
    fn test_purge_order_is_post_order() {
        let graph = chain();
        assert_eq!(
            graph.purge_order(),
            vec![
                TableName::new("OrderLines"),
                TableName::new("Orders"),
                TableName::new("Customers")
            ]
        );
    }

    #[test]
    fn test_dependent_closure_excludes_start() {
        let graph = chain();
        let customers = graph.find_by_name("customers").unwrap();
        let closure = graph.dependent_closure(customers);
        assert_eq!(names(&closure), vec!["OrderLines", "Orders"]);
    }

    #[test]
    fn test_dependent_closure_diamond() {
        // a <- b, a <- c, b <- d, c <- d
        let graph = DependencyGraph::build(
            &SchemaSnapshot::new()
                .table("a")
                .table("b")
                .table("c")
                .table("d")
                .foreign_key("b", "a")
                .foreign_key("c", "a")
                .foreign_key("d", "b")
                .foreign_key("d", "c"),
        )
        .unwrap();
        let a = graph.find_by_name("a").unwrap();
        let closure = graph.dependent_closure(a);
        assert_eq!(names(&closure), vec!["d", "b", "c"]);
    }

    #[test]
    fn test_real_table_named_root() {
        let graph = DependencyGraph::build(
            &SchemaSnapshot::new()
                .table("root")
                .table("leaf")
                .foreign_key("leaf", "root"),
        )
        .unwrap();
        let root_table = graph.find_by_name("Root").unwrap();
        assert!(!root_table.is_root());
        assert_eq!(graph.purge_order().len(), 2);
    }
}
