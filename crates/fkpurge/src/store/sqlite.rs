//! SQLite row store.
//!
//! Wraps a `rusqlite` connection. The schema (tables and foreign keys) is read
//! once when the store is opened, through `sqlite_master` and
//! `PRAGMA foreign_key_list`, and never re-read.
//!
//! # Row addressing
//!
//! Ordinary tables are addressed by `rowid`. `WITHOUT ROWID` tables have no
//! rowid; their rows are addressed by their primary-key columns instead. The
//! key values selected in a transaction are kept there, and the [`RowKey`]s
//! handed out for such a table index into that list.
//!
//! # Transactions
//!
//! A transaction holds the connection's lock until it is committed or rolled
//! back (or dropped, which rolls back). It is opened with `BEGIN IMMEDIATE`
//! and `PRAGMA defer_foreign_keys = ON`, so foreign-key constraints are checked
//! at commit rather than per statement; a purge may remove a referenced row
//! before its dependents inside the same transaction.
//!
//! # Filters
//!
//! Filters are passed to SQLite verbatim as the `WHERE` clause. They are
//! trusted input: anything SQLite accepts in a `WHERE` clause works, and
//! nothing is escaped.

// SQLite uses i64 for rowids and counts. Counts are never negative.
#![allow(clippy::cast_sign_loss)]

use crate::domain::{RowKey, SchemaSnapshot, TableKey, TableName};
use crate::error::{Error, Result};
use crate::filter::RowFilter;
use crate::store::{RowSource, RowStore, StoreTransaction};
use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, trace};

/// Statement run right after `BEGIN` in every transaction.
const DEFER_FOREIGN_KEYS: &str = "PRAGMA defer_foreign_keys = ON";

/// Read tables and table-level foreign keys from a connection.
///
/// Tables come back in creation order. Internal `sqlite_*` tables are skipped.
///
/// # Errors
///
/// Returns [`Error::Sqlite`] if the catalog cannot be read.
pub fn introspect_schema(conn: &Connection) -> Result<SchemaSnapshot> {
    let mut snapshot = SchemaSnapshot::new();

    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY rowid",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for name in &names {
        snapshot = snapshot.table(name.as_str());
    }

    for name in &names {
        let sql = format!("PRAGMA foreign_key_list({})", quote_identifier(name));
        let mut fk_stmt = conn.prepare(&sql)?;
        let referenced = fk_stmt
            .query_map([], |row| row.get::<_, String>("table"))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for references in referenced {
            // Composite keys yield one pragma row per column
            let fk = crate::domain::ForeignKey::new(name.as_str(), references);
            if !snapshot.foreign_keys.contains(&fk) {
                snapshot.foreign_keys.push(fk);
            }
        }
    }

    trace!(
        tables = snapshot.tables.len(),
        foreign_keys = snapshot.foreign_keys.len(),
        "Introspected SQLite schema"
    );

    Ok(snapshot)
}

/// How the rows of a table are addressed for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RowAddress {
    /// The implicit `rowid`
    Rowid,

    /// A `WITHOUT ROWID` table's primary-key columns, in key order
    PrimaryKey(Vec<String>),
}

#[derive(Debug, Clone)]
struct TableLayout {
    name: String,
    address: RowAddress,
}

fn row_address(conn: &Connection, table: &str) -> Result<RowAddress> {
    let without_rowid: i64 = conn.query_row(
        "SELECT wr FROM pragma_table_list WHERE schema = 'main' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    if without_rowid == 0 {
        return Ok(RowAddress::Rowid);
    }

    let mut stmt =
        conn.prepare("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(RowAddress::PrimaryKey(columns))
}

fn table_layouts(conn: &Connection, tables: &[TableName]) -> Result<HashMap<TableKey, TableLayout>> {
    let mut layouts = HashMap::with_capacity(tables.len());
    for table in tables {
        let address = row_address(conn, table.as_str())?;
        if address != RowAddress::Rowid {
            trace!(table = %table, ?address, "Table has no rowid");
        }
        layouts.insert(
            table.key(),
            TableLayout {
                name: table.as_str().to_string(),
                address,
            },
        );
    }
    Ok(layouts)
}

/// Quote an identifier for interpolation into SQL.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn where_clause(filter: Option<&RowFilter>) -> String {
    match filter.and_then(RowFilter::as_option) {
        Some(filter) => format!(" WHERE ({})", filter.expression()),
        None => String::new(),
    }
}

/// `BEGIN IMMEDIATE`, then `setup`. A failing `setup` is rolled back so the
/// connection is never left inside a transaction nobody owns.
fn open_transaction(conn: &Connection, setup: &str) -> Result<()> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    if let Err(e) = conn.execute_batch(setup) {
        if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
            error!(error = %rollback_err, "Rollback after failed transaction setup failed");
        }
        return Err(e.into());
    }
    Ok(())
}

/// Row store over a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    layouts: Arc<HashMap<TableKey, TableLayout>>,
    schema: Arc<SchemaSnapshot>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("tables", &self.schema.tables)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open a database file and read its schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sqlite`] if the file cannot be opened or its catalog
    /// cannot be read.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Wrap an existing connection and read its schema.
    ///
    /// Foreign-key enforcement is switched on for the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sqlite`] if the catalog cannot be read.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let schema = introspect_schema(&conn)?;
        let layouts = table_layouts(&conn, &schema.tables)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            layouts: Arc::new(layouts),
            schema: Arc::new(schema),
        })
    }

    /// The schema read when the store was opened.
    pub fn schema(&self) -> SchemaSnapshot {
        self.schema.as_ref().clone()
    }

    /// Run `f` with the connection, outside any purge transaction.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().await;
        f(&conn)
    }
}

#[async_trait]
impl RowStore for SqliteStore {
    fn resolve(&self, entity: &TableName) -> Option<String> {
        self.layouts.get(&entity.key()).map(|layout| layout.name.clone())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let conn = Arc::clone(&self.conn).lock_owned().await;
        open_transaction(&conn, DEFER_FOREIGN_KEYS)?;
        trace!("Began SQLite transaction");
        Ok(Box::new(SqliteTransaction {
            conn: Some(conn),
            layouts: Arc::clone(&self.layouts),
            selected: HashMap::new(),
            pending: Vec::new(),
        }))
    }
}

/// Staged removals resolved to what the `DELETE` statements bind.
enum Removal {
    Rowid {
        source: RowSource,
        keys: Vec<i64>,
    },
    PrimaryKey {
        source: RowSource,
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
    },
}

/// An open SQLite transaction. Dropping it without committing rolls back.
struct SqliteTransaction {
    /// `None` only while a save runs on the blocking pool, or once finished
    conn: Option<OwnedMutexGuard<Connection>>,
    layouts: Arc<HashMap<TableKey, TableLayout>>,
    /// Primary-key values selected from `WITHOUT ROWID` tables
    selected: HashMap<TableKey, Vec<Vec<SqlValue>>>,
    pending: Vec<(RowSource, Vec<RowKey>)>,
}

impl SqliteTransaction {
    fn connection(&self) -> Result<&Connection> {
        self.conn.as_deref().ok_or(Error::TransactionClosed)
    }

    fn address(&self, source: &RowSource) -> RowAddress {
        self.layouts
            .get(&TableKey::fold(&source.table))
            .map_or(RowAddress::Rowid, |layout| layout.address.clone())
    }

    fn finish(&mut self, statement: &str) -> Result<()> {
        let conn = self.conn.take().ok_or(Error::TransactionClosed)?;
        conn.execute_batch(statement)?;
        Ok(())
    }

    fn select_primary_keys(
        &mut self,
        source: &RowSource,
        columns: &[String],
        filter: Option<&RowFilter>,
    ) -> Result<Vec<RowKey>> {
        let column_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {column_list} FROM {}{}",
            quote_identifier(&source.table),
            where_clause(filter)
        );
        let to_persistence = |e: rusqlite::Error| Error::persistence(&source.entity, e.to_string());

        let rows = {
            let conn = self.connection()?;
            let mut stmt = conn.prepare(&sql).map_err(to_persistence)?;
            stmt.query_map([], |row| {
                (0..columns.len())
                    .map(|i| row.get::<_, SqlValue>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(to_persistence)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(to_persistence)?
        };

        let selected = self.selected.entry(TableKey::fold(&source.table)).or_default();
        let start = selected.len();
        selected.extend(rows);

        (start..selected.len())
            .map(|index| {
                i64::try_from(index)
                    .map(RowKey)
                    .map_err(|e| Error::persistence(&source.entity, e.to_string()))
            })
            .collect()
    }

    /// Drain the pending set into concrete removals.
    fn take_pending(&mut self) -> Result<Vec<Removal>> {
        let pending = std::mem::take(&mut self.pending);
        let mut removals = Vec::with_capacity(pending.len());

        for (source, keys) in pending {
            match self.address(&source) {
                RowAddress::Rowid => removals.push(Removal::Rowid {
                    keys: keys.into_iter().map(|key| key.0).collect(),
                    source,
                }),
                RowAddress::PrimaryKey(columns) => {
                    let selected = self.selected.get(&TableKey::fold(&source.table));
                    let rows = keys
                        .iter()
                        .map(|key| {
                            usize::try_from(key.0)
                                .ok()
                                .and_then(|index| selected?.get(index))
                                .cloned()
                                .ok_or_else(|| {
                                    Error::persistence(
                                        &source.entity,
                                        format!("row key {} was never selected", key.0),
                                    )
                                })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    removals.push(Removal::PrimaryKey {
                        source,
                        columns,
                        rows,
                    });
                }
            }
        }

        Ok(removals)
    }
}

/// Run the `DELETE`s for every removal, one prepared statement per table.
fn remove_pending(conn: &Connection, removals: &[Removal]) -> Result<u64> {
    let mut removed = 0;

    for removal in removals {
        match removal {
            Removal::Rowid { source, keys } => {
                let sql = format!(
                    "DELETE FROM {} WHERE rowid = ?1",
                    quote_identifier(&source.table)
                );
                let to_persistence =
                    |e: rusqlite::Error| Error::persistence(&source.entity, e.to_string());
                let mut stmt = conn.prepare_cached(&sql).map_err(to_persistence)?;

                for key in keys {
                    removed += stmt.execute([key]).map_err(to_persistence)? as u64;
                }
            }
            Removal::PrimaryKey {
                source,
                columns,
                rows,
            } => {
                let predicate = columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| format!("{} = ?{}", quote_identifier(column), i + 1))
                    .collect::<Vec<_>>()
                    .join(" AND ");
                let sql = format!(
                    "DELETE FROM {} WHERE {predicate}",
                    quote_identifier(&source.table)
                );
                let to_persistence =
                    |e: rusqlite::Error| Error::persistence(&source.entity, e.to_string());
                let mut stmt = conn.prepare_cached(&sql).map_err(to_persistence)?;

                for values in rows {
                    removed += stmt
                        .execute(rusqlite::params_from_iter(values.iter()))
                        .map_err(to_persistence)? as u64;
                }
            }
        }
    }

    Ok(removed)
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn select_keys(
        &mut self,
        source: &RowSource,
        filter: Option<&RowFilter>,
    ) -> Result<Vec<RowKey>> {
        if let RowAddress::PrimaryKey(columns) = self.address(source) {
            return self.select_primary_keys(source, &columns, filter);
        }

        let sql = format!(
            "SELECT rowid FROM {}{}",
            quote_identifier(&source.table),
            where_clause(filter)
        );
        let to_persistence = |e: rusqlite::Error| Error::persistence(&source.entity, e.to_string());

        let conn = self.connection()?;
        let mut stmt = conn.prepare(&sql).map_err(to_persistence)?;
        let keys = stmt
            .query_map([], |row| row.get::<_, i64>(0).map(RowKey))
            .map_err(to_persistence)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(to_persistence)?;
        Ok(keys)
    }

    async fn count_rows(
        &mut self,
        source: &RowSource,
        filter: Option<&RowFilter>,
    ) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            quote_identifier(&source.table),
            where_clause(filter)
        );
        let count: i64 = self
            .connection()?
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| Error::persistence(&source.entity, e.to_string()))?;
        Ok(count as u64)
    }

    fn stage_removal(&mut self, source: &RowSource, keys: Vec<RowKey>) {
        self.pending.push((source.clone(), keys));
    }

    fn save_changes(&mut self) -> Result<u64> {
        let removals = self.take_pending()?;
        remove_pending(self.connection()?, &removals)
    }

    async fn save_changes_async(&mut self) -> Result<u64> {
        let removals = self.take_pending()?;
        let conn = self.conn.take().ok_or(Error::TransactionClosed)?;

        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = remove_pending(&conn, &removals);
            (conn, result)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        self.conn = Some(conn);
        result
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let conn = self.conn.take().ok_or(Error::TransactionClosed)?;

        if let Err(e) = conn.execute_batch("COMMIT") {
            // A failed COMMIT (e.g. deferred foreign key) leaves the transaction open
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                error!(error = %rollback_err, "Rollback after failed commit failed");
            }
            return Err(e.into());
        }

        trace!("Committed SQLite transaction");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK")?;
        trace!("Rolled back SQLite transaction");
        Ok(())
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                error!(error = %e, "Rollback of abandoned transaction failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ForeignKey;

    const SCHEMA: &str = r"
        CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
        CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            customer_id INTEGER NOT NULL REFERENCES customers(id)
        );
        CREATE TABLE order_lines (
            id INTEGER PRIMARY KEY,
            order_id INTEGER NOT NULL REFERENCES orders(id),
            sku TEXT NOT NULL
        );
        CREATE TABLE audit_log (id INTEGER PRIMARY KEY, message TEXT);
        INSERT INTO customers (id, name) VALUES (1, 'Ada'), (2, 'Grace');
        INSERT INTO orders (id, customer_id) VALUES (10, 1), (11, 2);
        INSERT INTO order_lines (id, order_id, sku) VALUES (100, 10, 'A'), (101, 11, 'B');
    ";

    fn store() -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        SqliteStore::from_connection(conn).unwrap()
    }

    fn source(store: &SqliteStore, name: &str) -> RowSource {
        let entity = TableName::new(name);
        RowSource {
            table: store.resolve(&entity).unwrap(),
            entity,
        }
    }

    async fn count(store: &SqliteStore, table: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        store
            .with_connection(|conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
            .await
            .unwrap()
    }

    #[test]
    fn test_introspection() {
        let schema = store().schema();
        assert_eq!(
            schema.tables,
            vec![
                TableName::new("customers"),
                TableName::new("orders"),
                TableName::new("order_lines"),
                TableName::new("audit_log"),
            ]
        );
        assert_eq!(
            schema.foreign_keys,
            vec![
                ForeignKey::new("orders", "customers"),
                ForeignKey::new("order_lines", "orders"),
            ]
        );
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("plain"), "\"plain\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[tokio::test]
    async fn test_select_and_count() {
        let store = store();
        let customers = source(&store, "Customers");

        let mut tx = store.begin().await.unwrap();
        let filter = RowFilter::new("name = 'Ada'");
        let keys = tx.select_keys(&customers, Some(&filter)).await.unwrap();
        assert_eq!(keys, vec![RowKey(1)]);
        assert_eq!(tx.count_rows(&customers, None).await.unwrap(), 2);
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_filter_is_persistence_error() {
        let store = store();
        let customers = source(&store, "customers");

        let mut tx = store.begin().await.unwrap();
        let filter = RowFilter::new("no_such_column = 1");
        let err = tx.select_keys(&customers, Some(&filter)).await.unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_deferred_foreign_keys_allow_parent_first() {
        let store = store();
        let customers = source(&store, "customers");
        let orders = source(&store, "orders");
        let lines = source(&store, "order_lines");

        let mut tx = store.begin().await.unwrap();
        for table in [&customers, &orders, &lines] {
            let keys = tx.select_keys(table, None).await.unwrap();
            tx.stage_removal(table, keys);
            tx.save_changes().unwrap();
        }
        tx.commit().await.unwrap();

        assert_eq!(count(&store, "customers").await, 0);
        assert_eq!(count(&store, "order_lines").await, 0);
    }

    #[tokio::test]
    async fn test_commit_with_dangling_reference_rolls_back() {
        let store = store();
        let customers = source(&store, "customers");

        let mut tx = store.begin().await.unwrap();
        let keys = tx.select_keys(&customers, None).await.unwrap();
        tx.stage_removal(&customers, keys);
        assert_eq!(tx.save_changes_async().await.unwrap(), 2);
        assert!(tx.commit().await.is_err());

        assert_eq!(count(&store, "customers").await, 2);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = store();
        let lines = source(&store, "order_lines");

        {
            let mut tx = store.begin().await.unwrap();
            let keys = tx.select_keys(&lines, None).await.unwrap();
            tx.stage_removal(&lines, keys);
            tx.save_changes().unwrap();
        }

        assert_eq!(count(&store, "order_lines").await, 2);
    }

    const TAGGED: &str = r"
        CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
        CREATE TABLE tags (
            customer_id INTEGER NOT NULL REFERENCES customers(id),
            label TEXT NOT NULL,
            PRIMARY KEY (label, customer_id)
        ) WITHOUT ROWID;
        INSERT INTO customers (id, name) VALUES (1, 'Ada'), (2, 'Grace');
        INSERT INTO tags (customer_id, label) VALUES (1, 'vip'), (1, 'beta'), (2, 'vip');
    ";

    fn tagged_store() -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(TAGGED).unwrap();
        SqliteStore::from_connection(conn).unwrap()
    }

    #[test]
    fn test_without_rowid_layout() {
        let store = tagged_store();

        let tags = &store.layouts[&TableKey::fold("tags")];
        assert_eq!(
            tags.address,
            RowAddress::PrimaryKey(vec!["label".to_string(), "customer_id".to_string()])
        );
        assert_eq!(store.layouts[&TableKey::fold("customers")].address, RowAddress::Rowid);
    }

    #[tokio::test]
    async fn test_without_rowid_rows_removed_by_primary_key() {
        let store = tagged_store();
        let tags = source(&store, "tags");

        let mut tx = store.begin().await.unwrap();
        let first = tx
            .select_keys(&tags, Some(&RowFilter::new("customer_id = 1")))
            .await
            .unwrap();
        let second = tx
            .select_keys(&tags, Some(&RowFilter::new("customer_id = 2")))
            .await
            .unwrap();
        assert_eq!(first, vec![RowKey(0), RowKey(1)]);
        assert_eq!(second, vec![RowKey(2)]);

        tx.stage_removal(&tags, first);
        assert_eq!(tx.save_changes_async().await.unwrap(), 2);
        tx.commit().await.unwrap();

        assert_eq!(count(&store, "tags").await, 1);
        let remaining: i64 = store
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT customer_id FROM tags", [], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(remaining, 2);
    }

    #[tokio::test]
    async fn test_unselected_key_is_persistence_error() {
        let store = tagged_store();
        let tags = source(&store, "tags");

        let mut tx = store.begin().await.unwrap();
        tx.stage_removal(&tags, vec![RowKey(7)]);
        let err = tx.save_changes().unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
        tx.rollback().await.unwrap();

        assert_eq!(count(&store, "tags").await, 3);
    }

    #[test]
    fn test_failed_setup_leaves_no_open_transaction() {
        let conn = Connection::open_in_memory().unwrap();

        assert!(open_transaction(&conn, "NOT A STATEMENT").is_err());
        assert!(conn.is_autocommit());

        open_transaction(&conn, DEFER_FOREIGN_KEYS).unwrap();
        assert!(!conn.is_autocommit());
        conn.execute_batch("ROLLBACK").unwrap();
    }

    #[tokio::test]
    async fn test_finished_transaction_is_closed() {
        let store = store();
        let customers = source(&store, "customers");

        let mut tx = SqliteTransaction {
            conn: Some(Arc::clone(&store.conn).lock_owned().await),
            layouts: Arc::clone(&store.layouts),
            selected: HashMap::new(),
            pending: Vec::new(),
        };
        open_transaction(tx.connection().unwrap(), DEFER_FOREIGN_KEYS).unwrap();
        tx.finish("ROLLBACK").unwrap();

        assert!(matches!(tx.finish("ROLLBACK"), Err(Error::TransactionClosed)));
        assert!(matches!(
            tx.count_rows(&customers, None).await,
            Err(Error::TransactionClosed)
        ));
        assert!(matches!(
            Box::new(tx).commit().await,
            Err(Error::TransactionClosed)
        ));
    }
}
