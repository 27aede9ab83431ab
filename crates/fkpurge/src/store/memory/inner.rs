//! Core in-memory database structures.
//!
//! `MemoryDatabase` holds the committed state and is wrapped in
//! `Arc<Mutex<>>` by [`super::MemoryStore`]. Transactions work on a clone of
//! `tables` and swap it back in on commit.

use super::Row;
use crate::domain::{RowKey, TableKey, TableName, Value};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// One table: rows keyed by their store-assigned [`RowKey`].
#[derive(Debug, Clone)]
pub(crate) struct MemoryTable {
    pub(crate) name: TableName,
    pub(crate) rows: BTreeMap<RowKey, Row>,
}

impl MemoryTable {
    pub(crate) fn new(name: TableName) -> Self {
        Self {
            name,
            rows: BTreeMap::new(),
        }
    }
}

/// Column-level foreign key used for integrity checks at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnForeignKey {
    /// Referencing table
    pub table: TableName,
    /// Referencing column
    pub column: String,
    /// Referenced table
    pub references: TableName,
    /// Referenced column
    pub referenced_column: String,
}

/// A committed removal, recorded in commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteEvent {
    /// Table rows were removed from
    pub table: TableName,
    /// Number of rows removed
    pub rows: u64,
}

/// Committed state of a [`super::MemoryStore`].
#[derive(Debug, Default)]
pub(crate) struct MemoryDatabase {
    /// Tables by case-folded name
    pub(crate) tables: HashMap<TableKey, MemoryTable>,

    /// Column-level foreign keys
    pub(crate) foreign_keys: Vec<ColumnForeignKey>,

    /// Tables whose staged removals fail when saved
    pub(crate) faults: HashSet<TableKey>,

    /// Every committed removal, oldest first
    pub(crate) history: Vec<DeleteEvent>,

    /// Next key handed out by `insert`
    pub(crate) next_key: i64,
}

impl MemoryDatabase {
    /// Insert a row, folding column names to lower case.
    pub(crate) fn insert(&mut self, table: &TableName, row: Row) -> Result<RowKey> {
        let target = self
            .tables
            .get_mut(&table.key())
            .ok_or_else(|| Error::RowSourceNotFound(table.clone()))?;

        self.next_key += 1;
        let key = RowKey(self.next_key);
        let row = row
            .into_iter()
            .map(|(column, value)| (column.to_ascii_lowercase(), value))
            .collect();
        target.rows.insert(key, row);
        Ok(key)
    }
}

/// Find the first row that references a row missing from its parent table.
///
/// `NULL` foreign-key values never violate. Returns a description of the
/// violation, if any.
pub(crate) fn find_violation(
    tables: &HashMap<TableKey, MemoryTable>,
    foreign_keys: &[ColumnForeignKey],
) -> Option<String> {
    for fk in foreign_keys {
        let (Some(child), Some(parent)) = (
            tables.get(&fk.table.key()),
            tables.get(&fk.references.key()),
        ) else {
            continue;
        };

        let column = fk.column.to_ascii_lowercase();
        let parent_column = fk.referenced_column.to_ascii_lowercase();

        for row in child.rows.values() {
            let Some(value) = row.get(&column).filter(|v| !v.is_null()) else {
                continue;
            };

            let found = parent
                .rows
                .values()
                .any(|parent_row| parent_row.get(&parent_column) == Some(value));

            if !found {
                return Some(format!(
                    "{}.{} = {} references a missing {}.{} row",
                    fk.table, fk.column, value, fk.references, fk.referenced_column
                ));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database() -> MemoryDatabase {
        let mut db = MemoryDatabase::default();
        for name in ["customers", "orders"] {
            let name = TableName::new(name);
            db.tables.insert(name.key(), MemoryTable::new(name));
        }
        db.foreign_keys.push(ColumnForeignKey {
            table: TableName::new("orders"),
            column: "customer_id".to_string(),
            references: TableName::new("customers"),
            referenced_column: "id".to_string(),
        });
        db
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_insert_folds_column_names() {
        let mut db = database();
        let key = db
            .insert(&TableName::new("Customers"), row(&[("ID", Value::Integer(1))]))
            .unwrap();
        let stored = &db.tables[&TableName::new("customers").key()].rows[&key];
        assert_eq!(stored.get("id"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_insert_into_unknown_table() {
        let mut db = database();
        assert!(matches!(
            db.insert(&TableName::new("nope"), Row::new()),
            Err(Error::RowSourceNotFound(_))
        ));
    }

    #[test]
    fn test_violation_detection() {
        let mut db = database();
        let customers = TableName::new("customers");
        let orders = TableName::new("orders");
        db.insert(&customers, row(&[("id", Value::Integer(1))])).unwrap();
        db.insert(&orders, row(&[("customer_id", Value::Integer(1))]))
            .unwrap();
        db.insert(&orders, row(&[("customer_id", Value::Null)]))
            .unwrap();
        assert!(find_violation(&db.tables, &db.foreign_keys).is_none());

        db.tables.get_mut(&customers.key()).unwrap().rows.clear();
        let violation = find_violation(&db.tables, &db.foreign_keys).unwrap();
        assert!(violation.contains("orders.customer_id"));
    }
}
