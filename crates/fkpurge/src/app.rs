//! Application context for CLI command execution.
//!
//! Opens the database, reads its schema, builds the dependency graph once and
//! hands out purge engines configured per command.

use crate::config::PurgeConfig;
use crate::engine::PurgeEngine;
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::store::sqlite::SqliteStore;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Application context for CLI operations.
#[derive(Debug)]
pub struct App {
    store: SqliteStore,
    graph: Arc<DependencyGraph>,
    config: PurgeConfig,
}

impl App {
    /// Open `database` and load `config_path` (defaults if `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened, its schema yields an
    /// invalid graph, or the configuration file cannot be loaded.
    pub async fn open(database: &Path, config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => PurgeConfig::load(path).await?,
            None => PurgeConfig::default(),
        };

        let store = SqliteStore::open(database)?;
        let graph = Arc::new(DependencyGraph::build(&store.schema())?);
        debug!(database = %database.display(), tables = graph.len(), "Opened database");

        Ok(Self {
            store,
            graph,
            config,
        })
    }

    /// The dependency graph of the database.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// The configuration loaded at startup.
    pub fn config(&self) -> PurgeConfig {
        self.config
    }

    /// A purge engine over this database using `config`.
    pub fn engine(&self, config: PurgeConfig) -> PurgeEngine {
        PurgeEngine::new(Arc::clone(&self.graph), Arc::new(self.store.clone()), config)
    }
}
