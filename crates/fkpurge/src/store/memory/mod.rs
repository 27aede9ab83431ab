//! In-memory row store.
//!
//! All data is held in RAM and lost when the process exits. It is suitable
//! for tests, examples, and dry runs against a schema described by hand.
//!
//! # Architecture
//!
//! - `HashMap<TableKey, MemoryTable>` of committed rows, behind
//!   `Arc<Mutex<MemoryDatabase>>`
//! - A transaction takes the mutex (owned guard) for its whole lifetime and
//!   works on a clone of the tables; commit swaps the clone in, rollback drops
//!   it
//! - Column-level foreign keys are checked on the working copy at commit,
//!   which gives deferred-constraint semantics
//! - Fault injection ([`MemoryStore::fail_saves_on`]) makes saves touching a
//!   table fail, for exercising rollback paths
//!
//! # Example
//!
//! ```
//! use fkpurge::domain::Value;
//! use fkpurge::store::memory::MemoryStore;
//!
//! let store = MemoryStore::builder()
//!     .table("customers")
//!     .table("orders")
//!     .foreign_key("orders", "customer_id", "customers", "id")
//!     .row("customers", [("id", Value::from(1))])
//!     .row("orders", [("id", Value::from(10)), ("customer_id", Value::from(1))])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(store.schema().foreign_keys.len(), 1);
//! ```

mod inner;
mod transaction;

pub use inner::{ColumnForeignKey, DeleteEvent};

use crate::domain::{ForeignKey, RowKey, SchemaSnapshot, TableKey, TableName, Value};
use crate::error::Result;
use crate::store::{RowStore, StoreTransaction};
use async_trait::async_trait;
use inner::{MemoryDatabase, MemoryTable};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use transaction::MemoryTransaction;

/// A row: lower-cased column name to value.
pub type Row = BTreeMap<String, Value>;

/// Thread-safe in-memory store.
///
/// Cloning is cheap and yields a handle to the same data.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryDatabase>>,

    /// Declared tables; fixed at build time, so resolution needs no lock
    catalog: Arc<Catalog>,
}

#[derive(Debug, Default)]
struct Catalog {
    names: HashMap<TableKey, TableName>,
    schema: SchemaSnapshot,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("tables", &self.catalog.schema.tables)
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Start describing a store.
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    /// Tables and table-level foreign keys, ready for
    /// [`DependencyGraph::build`](crate::graph::DependencyGraph::build).
    pub fn schema(&self) -> SchemaSnapshot {
        self.catalog.schema.clone()
    }

    /// Insert a row outside any purge transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RowSourceNotFound`](crate::error::Error::RowSourceNotFound)
    /// if the table does not exist.
    pub async fn insert<I, C>(&self, table: &str, row: I) -> Result<RowKey>
    where
        I: IntoIterator<Item = (C, Value)>,
        C: Into<String>,
    {
        let row: Row = row.into_iter().map(|(c, v)| (c.into(), v)).collect();
        self.state.lock().await.insert(&TableName::new(table), row)
    }

    /// Committed rows of `table` in key order (empty if the table is unknown).
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        let state = self.state.lock().await;
        state
            .tables
            .get(&TableKey::fold(table))
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of committed rows in `table`.
    pub async fn count(&self, table: &str) -> usize {
        let state = self.state.lock().await;
        state
            .tables
            .get(&TableKey::fold(table))
            .map_or(0, |t| t.rows.len())
    }

    /// Every committed removal so far, oldest first.
    pub async fn history(&self) -> Vec<DeleteEvent> {
        self.state.lock().await.history.clone()
    }

    /// Make every later save that touches `table` fail.
    pub async fn fail_saves_on(&self, table: &str) {
        self.state.lock().await.faults.insert(TableKey::fold(table));
    }

    /// Undo [`fail_saves_on`](Self::fail_saves_on).
    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    fn resolve(&self, entity: &TableName) -> Option<String> {
        self.catalog
            .names
            .get(&entity.key())
            .map(|name| name.as_str().to_string())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(MemoryTransaction::new(guard)))
    }
}

/// Builder for [`MemoryStore`].
#[derive(Debug, Default)]
pub struct MemoryStoreBuilder {
    tables: Vec<TableName>,
    foreign_keys: Vec<ColumnForeignKey>,
    rows: Vec<(TableName, Row)>,
}

impl MemoryStoreBuilder {
    /// Declare a table.
    #[must_use]
    pub fn table(mut self, name: &str) -> Self {
        self.tables.push(TableName::new(name));
        self
    }

    /// Declare that `table.column` references `references.referenced_column`.
    #[must_use]
    pub fn foreign_key(
        mut self,
        table: &str,
        column: &str,
        references: &str,
        referenced_column: &str,
    ) -> Self {
        self.foreign_keys.push(ColumnForeignKey {
            table: TableName::new(table),
            column: column.to_string(),
            references: TableName::new(references),
            referenced_column: referenced_column.to_string(),
        });
        self
    }

    /// Seed a row.
    #[must_use]
    pub fn row<I, C>(mut self, table: &str, row: I) -> Self
    where
        I: IntoIterator<Item = (C, Value)>,
        C: Into<String>,
    {
        let row = row.into_iter().map(|(c, v)| (c.into(), v)).collect();
        self.rows.push((TableName::new(table), row));
        self
    }

    /// Build the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](crate::error::Error::Configuration) if a
    /// foreign key names an undeclared table, or
    /// [`Error::RowSourceNotFound`](crate::error::Error::RowSourceNotFound) if a
    /// seeded row targets one.
    pub fn build(self) -> Result<MemoryStore> {
        let mut database = MemoryDatabase::default();
        let mut catalog = Catalog::default();

        for name in self.tables {
            if catalog.names.contains_key(&name.key()) {
                continue;
            }
            database
                .tables
                .insert(name.key(), MemoryTable::new(name.clone()));
            catalog.names.insert(name.key(), name.clone());
            catalog.schema.tables.push(name);
        }

        for fk in &self.foreign_keys {
            for name in [&fk.table, &fk.references] {
                if !catalog.names.contains_key(&name.key()) {
                    return Err(crate::error::Error::Configuration(format!(
                        "foreign key {}.{} names undeclared table '{}'",
                        fk.table, fk.column, name
                    )));
                }
            }
            let edge = ForeignKey::new(fk.table.clone(), fk.references.clone());
            if !catalog.schema.foreign_keys.contains(&edge) {
                catalog.schema.foreign_keys.push(edge);
            }
        }
        database.foreign_keys = self.foreign_keys;

        for (table, row) in self.rows {
            database.insert(&table, row)?;
        }

        Ok(MemoryStore {
            state: Arc::new(Mutex::new(database)),
            catalog: Arc::new(catalog),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::RowFilter;
    use crate::store::RowSource;

    fn store() -> MemoryStore {
        MemoryStore::builder()
            .table("Customers")
            .table("Orders")
            .foreign_key("Orders", "customer_id", "Customers", "id")
            .row("Customers", [("id", Value::from(1))])
            .row("Customers", [("id", Value::from(2))])
            .row("Orders", [("id", Value::from(10)), ("customer_id", Value::from(1))])
            .build()
            .unwrap()
    }

    fn source(name: &str) -> RowSource {
        RowSource {
            entity: TableName::new(name),
            table: name.to_string(),
        }
    }

    #[test]
    fn test_schema_snapshot() {
        let schema = store().schema();
        assert_eq!(
            schema.tables,
            vec![TableName::new("Customers"), TableName::new("Orders")]
        );
        assert_eq!(
            schema.foreign_keys,
            vec![ForeignKey::new("Orders", "Customers")]
        );
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let store = store();
        assert_eq!(
            store.resolve(&TableName::new("orders")),
            Some("Orders".to_string())
        );
        assert_eq!(store.resolve(&TableName::new("missing")), None);
    }

    #[test]
    fn test_undeclared_table_in_foreign_key() {
        let result = MemoryStore::builder()
            .table("orders")
            .foreign_key("orders", "customer_id", "customers", "id")
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_commit_applies_removals() {
        let store = store();
        let orders = source("Orders");

        let mut tx = store.begin().await.unwrap();
        let keys = tx.select_keys(&orders, None).await.unwrap();
        assert_eq!(keys.len(), 1);
        tx.stage_removal(&orders, keys);
        assert_eq!(tx.save_changes().unwrap(), 1);
        tx.commit().await.unwrap();

        assert_eq!(store.count("orders").await, 0);
        assert_eq!(
            store.history().await,
            vec![DeleteEvent {
                table: TableName::new("Orders"),
                rows: 1
            }]
        );
    }

    #[tokio::test]
    async fn test_rollback_discards_removals() {
        let store = store();
        let customers = source("Customers");

        let mut tx = store.begin().await.unwrap();
        let filter = RowFilter::new("id = 2");
        let keys = tx.select_keys(&customers, Some(&filter)).await.unwrap();
        tx.stage_removal(&customers, keys);
        assert_eq!(tx.save_changes_async().await.unwrap(), 1);
        tx.rollback().await.unwrap();

        assert_eq!(store.count("customers").await, 2);
        assert!(store.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_commit_rejects_dangling_reference() {
        let store = store();
        let customers = source("Customers");

        let mut tx = store.begin().await.unwrap();
        let filter = RowFilter::new("id = 1");
        let keys = tx.select_keys(&customers, Some(&filter)).await.unwrap();
        tx.stage_removal(&customers, keys);
        tx.save_changes().unwrap();
        let err = tx.commit().await.unwrap_err();

        assert!(matches!(err, crate::error::Error::ConstraintViolation(_)));
        assert_eq!(store.count("customers").await, 2);
    }

    #[tokio::test]
    async fn test_injected_fault() {
        let store = store();
        store.fail_saves_on("orders").await;
        let orders = source("Orders");

        let mut tx = store.begin().await.unwrap();
        let keys = tx.select_keys(&orders, None).await.unwrap();
        tx.stage_removal(&orders, keys);
        assert!(tx.save_changes().is_err());
        tx.rollback().await.unwrap();

        store.clear_faults().await;
        assert_eq!(store.count("orders").await, 1);
    }

    #[tokio::test]
    async fn test_count_rows_with_filter() {
        let store = store();
        let customers = source("customers");

        let mut tx = store.begin().await.unwrap();
        let filter = RowFilter::new("ID >= 2");
        assert_eq!(tx.count_rows(&customers, Some(&filter)).await.unwrap(), 1);
        assert_eq!(tx.count_rows(&customers, None).await.unwrap(), 2);
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_after_build() {
        let store = store();
        store
            .insert("orders", [("id", Value::from(11)), ("customer_id", Value::from(2))])
            .await
            .unwrap();
        assert_eq!(store.rows("ORDERS").await.len(), 2);
    }
}
