//! Domain types shared by the graph, the stores, and the purge engine.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Name of a table or entity.
///
/// Equality and hashing ignore ASCII case, so `Orders` and `orders` name the
/// same table. The original spelling is kept for display and for talking to
/// the backing store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableName(String);

impl TableName {
    /// Create a new table name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as originally spelled.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The lower-cased lookup key.
    pub fn key(&self) -> TableKey {
        TableKey(self.0.to_ascii_lowercase())
    }
}

impl PartialEq for TableName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for TableName {}

impl Hash for TableName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_u8(0xff);
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TableName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TableName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Case-folded table name used as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey(String);

impl TableKey {
    /// Fold an arbitrary name into a key.
    pub fn fold(name: &str) -> Self {
        Self(name.to_ascii_lowercase())
    }
}

impl Borrow<str> for TableKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A foreign key from `table` into `references`.
///
/// Produces the graph edge `references -> table`: rows of `table` must go
/// before the rows of `references` they point at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// The referencing (dependent) table
    pub table: TableName,

    /// The referenced table
    pub references: TableName,
}

impl ForeignKey {
    /// Create a foreign key from `table` into `references`
    pub fn new(table: impl Into<TableName>, references: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            references: references.into(),
        }
    }
}

/// Static snapshot of a schema's tables and foreign keys.
///
/// This is everything the dependency graph needs. `tables` should list every
/// table, including isolated ones without foreign keys; when it is empty the
/// table set is derived from the foreign keys alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// All tables in declaration order
    pub tables: Vec<TableName>,

    /// Foreign keys between those tables
    pub foreign_keys: Vec<ForeignKey>,
}

impl SchemaSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table (builder style)
    #[must_use]
    pub fn table(mut self, name: impl Into<TableName>) -> Self {
        self.tables.push(name.into());
        self
    }

    /// Add a foreign key from `table` into `references` (builder style)
    #[must_use]
    pub fn foreign_key(
        mut self,
        table: impl Into<TableName>,
        references: impl Into<TableName>,
    ) -> Self {
        self.foreign_keys.push(ForeignKey::new(table, references));
        self
    }
}

/// Opaque key of a single row inside a store.
///
/// The in-memory store hands out sequential keys; the SQLite store uses rowids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey(pub i64);

/// A single column value held by the in-memory store and compared by filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL `NULL`
    Null,

    /// Boolean
    Boolean(bool),

    /// 64-bit signed integer
    Integer(i64),

    /// 64-bit float
    Real(f64),

    /// UTF-8 text
    Text(String),
}

impl Value {
    /// Whether this value is `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_name_ignores_case() {
        assert_eq!(TableName::new("Orders"), TableName::new("ORDERS"));
        assert_eq!(TableName::new("Orders").key(), TableName::new("orders").key());

        let mut set = HashSet::new();
        set.insert(TableName::new("Orders"));
        assert!(set.contains(&TableName::new("orders")));
    }

    #[test]
    fn test_table_name_keeps_spelling() {
        let name = TableName::new("OrderLines");
        assert_eq!(name.as_str(), "OrderLines");
        assert_eq!(name.to_string(), "OrderLines");
    }

    #[test]
    fn test_snapshot_builder() {
        let snapshot = SchemaSnapshot::new()
            .table("customers")
            .table("orders")
            .foreign_key("orders", "customers");

        assert_eq!(snapshot.tables.len(), 2);
        assert_eq!(
            snapshot.foreign_keys,
            vec![ForeignKey::new("orders", "customers")]
        );
    }
}
