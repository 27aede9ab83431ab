//! fkpurge - foreign-key aware cascading row purges.
//!
//! Builds a dependency graph of tables from their foreign keys and deletes a
//! table's rows together with every row that (transitively) depends on them,
//! in one transaction, deepest dependents first.
//!
//! ```
//! use fkpurge::cancel::CancellationFlag;
//! use fkpurge::config::PurgeConfig;
//! use fkpurge::domain::Value;
//! use fkpurge::engine::PurgeEngine;
//! use fkpurge::filter::RowFilter;
//! use fkpurge::graph::DependencyGraph;
//! use fkpurge::store::memory::MemoryStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> fkpurge::error::Result<()> {
//! let store = MemoryStore::builder()
//!     .table("customers")
//!     .table("orders")
//!     .foreign_key("orders", "customer_id", "customers", "id")
//!     .row("customers", [("id", Value::from(1))])
//!     .row("orders", [("id", Value::from(10)), ("customer_id", Value::from(1))])
//!     .build()?;
//!
//! let graph = Arc::new(DependencyGraph::build(&store.schema())?);
//! let engine = PurgeEngine::new(graph, Arc::new(store.clone()), PurgeConfig::default());
//!
//! let report = engine
//!     .purge("customers", &RowFilter::new("id = 1"), &CancellationFlag::new())
//!     .await?;
//! assert_eq!(report.total_deleted(), 2);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod cancel;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod filter;
pub mod graph;
pub mod store;

// Public CLI module (needed by binary)
pub mod cli;

pub mod app;
pub mod output;

pub use error::{Error, Result};
