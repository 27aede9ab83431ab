//! Data-access layer used by the purge engine.
//!
//! The engine never talks to a database directly. It goes through two traits:
//!
//! - [`RowStore`]: resolves table names to row sources and opens transactions
//! - [`StoreTransaction`]: selects, stages, and persists row removals inside
//!   one transaction, then commits or rolls back
//!
//! Two backends are provided:
//!
//! - **In-memory** ([`memory::MemoryStore`]): rows in `HashMap`s with
//!   snapshot-based transactions, foreign-key checks at commit, and fault
//!   injection for tests
//! - **SQLite** ([`sqlite::SqliteStore`]): a `rusqlite` connection with schema
//!   introspection through `PRAGMA foreign_key_list`
//!
//! # Row Sources
//!
//! Resolving a table name to something deletable is done once per table when
//! the engine is constructed, through [`RowStore::resolve`]. The results are
//! kept in a [`RowSourceRegistry`]; a table that does not resolve simply has no
//! entry, and purges skip it.
//!
//! # Persistence Paths
//!
//! A transaction can persist staged removals synchronously
//! ([`StoreTransaction::save_changes`]) or asynchronously
//! ([`StoreTransaction::save_changes_async`]). The two are required to be
//! transactionally equivalent; [`PersistMode`] picks one for a whole purge.

pub mod memory;
pub mod sqlite;

use crate::domain::{RowKey, TableKey, TableName};
use crate::error::Result;
use crate::filter::RowFilter;
use crate::graph::DependencyGraph;
use async_trait::async_trait;
use std::collections::HashMap;

/// Which save path a purge uses for every delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMode {
    /// [`StoreTransaction::save_changes`]
    Synchronous,

    /// [`StoreTransaction::save_changes_async`]
    Asynchronous,
}

impl PersistMode {
    /// The mode selected by the `soft-delete` configuration flag.
    pub fn from_soft_delete(soft_delete: bool) -> Self {
        if soft_delete {
            PersistMode::Asynchronous
        } else {
            PersistMode::Synchronous
        }
    }
}

/// A table resolved to something the store can delete from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSource {
    /// The entity name as it appears in the dependency graph
    pub entity: TableName,

    /// The store's own name for the table
    pub table: String,
}

/// Entity name to row source, built once per engine.
#[derive(Debug, Clone, Default)]
pub struct RowSourceRegistry {
    sources: HashMap<TableKey, RowSource>,
}

impl RowSourceRegistry {
    /// Resolve every table of `graph` against `store`.
    ///
    /// Tables the store cannot resolve are logged and left out.
    pub fn build(graph: &DependencyGraph, store: &dyn RowStore) -> Self {
        let mut sources = HashMap::with_capacity(graph.len());

        for vertex in graph.tables() {
            let entity = vertex.name();
            match store.resolve(entity) {
                Some(table) => {
                    sources.insert(
                        entity.key(),
                        RowSource {
                            entity: entity.clone(),
                            table,
                        },
                    );
                }
                None => {
                    tracing::debug!(table = %entity, "No row source for table");
                }
            }
        }

        Self { sources }
    }

    /// Look up the row source for `entity` (case-insensitive).
    pub fn get(&self, entity: &TableName) -> Option<&RowSource> {
        self.sources.get(&entity.key())
    }

    /// Number of resolved tables.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no table resolved.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// A backing store the purge engine can delete from.
///
/// Implementations must be `Send + Sync` so one store can serve purges from
/// several tasks. Each transaction holds exclusive access to the underlying
/// connection or state until it is committed or rolled back.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Resolve an entity name to the store's table name.
    ///
    /// Returns `None` if the store has no such table.
    fn resolve(&self, entity: &TableName) -> Option<String>;

    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot start a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

/// One open transaction against a [`RowStore`].
///
/// Removals are two-phase: [`stage_removal`](Self::stage_removal) adds rows to
/// the pending-change set, and a save call persists everything pending. Nothing
/// is visible outside the transaction until [`commit`](Self::commit).
#[async_trait]
pub trait StoreTransaction: Send {
    /// Keys of the rows of `source` matching `filter` (all rows for `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is invalid or the read fails.
    async fn select_keys(
        &mut self,
        source: &RowSource,
        filter: Option<&RowFilter>,
    ) -> Result<Vec<RowKey>>;

    /// Number of rows of `source` matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is invalid or the read fails.
    async fn count_rows(&mut self, source: &RowSource, filter: Option<&RowFilter>)
        -> Result<u64>;

    /// Add rows to the pending-change set.
    fn stage_removal(&mut self, source: &RowSource, keys: Vec<RowKey>);

    /// Persist all pending removals, returning how many rows were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if any pending removal fails.
    fn save_changes(&mut self) -> Result<u64>;

    /// Asynchronous counterpart of [`save_changes`](Self::save_changes).
    ///
    /// # Errors
    ///
    /// Returns an error if any pending removal fails.
    async fn save_changes_async(&mut self) -> Result<u64>;

    /// Make every persisted removal permanent.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; the transaction is then rolled
    /// back by the backend.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every removal made in this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to roll back.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
