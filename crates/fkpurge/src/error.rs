//! Error types for fkpurge operations.
//!
//! Errors fall into two groups:
//!
//! - **Construction errors** (`Configuration`): the schema snapshot or config
//!   file is unusable. These are fatal and keep the graph (and therefore the
//!   engine) from being built.
//! - **Purge errors** (`Persistence`, `Cancelled`, `Filter`, `Sqlite`): scoped
//!   to a single purge. The transaction is rolled back before they reach the
//!   caller.
//!
//! `VertexNotFound` and `RowSourceNotFound` are lenient conditions inside a
//! purge (logged, not returned), but are still surfaced by lookups that the
//! caller asked for directly.

use crate::domain::TableName;
use crate::filter::FilterError;
use std::io;
use thiserror::Error;

/// The error type for fkpurge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Requested table is not a vertex of the dependency graph.
    #[error("Table not found in dependency graph: {0}")]
    VertexNotFound(TableName),

    /// Table has no resolvable row source in the data-access layer.
    #[error("No row source for table: {0}")]
    RowSourceNotFound(TableName),

    /// Selecting, staging, or saving rows failed.
    #[error("Persistence failure on {table}: {message}")]
    Persistence {
        /// The table being purged when the failure happened
        table: TableName,
        /// Backend-provided description of the failure
        message: String,
    },

    /// Committing would leave a row referencing a missing row.
    #[error("Foreign key constraint violated: {0}")]
    ConstraintViolation(String),

    /// Schema snapshot or configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Row filter could not be parsed or evaluated.
    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),

    /// The caller cancelled the purge; the transaction was rolled back.
    #[error("Purge cancelled")]
    Cancelled,

    /// The store transaction was already committed or rolled back.
    #[error("Transaction is no longer open")]
    TransactionClosed,

    /// SQLite operation failed.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Build a [`Error::Persistence`] for `table`.
    pub fn persistence(table: &TableName, message: impl Into<String>) -> Self {
        Self::Persistence {
            table: table.clone(),
            message: message.into(),
        }
    }
}

/// A specialized Result type for fkpurge operations.
pub type Result<T> = std::result::Result<T, Error>;
