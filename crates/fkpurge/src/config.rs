//! Purge configuration.
//!
//! Stored as YAML with kebab-case keys. Every key is optional:
//!
//! ```yaml
//! soft-delete: false
//! entry-points: top-level   # or: any-table
//! target-order: last        # or: first
//! ```

use crate::engine::TargetOrder;
use crate::error::{Error, Result};
use crate::graph::EntryPointScope;
use crate::store::PersistMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Settings for a [`crate::engine::PurgeEngine`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PurgeConfig {
    /// Persist deletes through the asynchronous save path
    pub soft_delete: bool,

    /// Which tables a purge may start from
    pub entry_points: EntryPointScope,

    /// Whether the filtered target is deleted before or after its dependents
    pub target_order: TargetOrder,
}

impl PurgeConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::Configuration`] if it is not valid configuration YAML.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))
    }

    /// Save configuration to a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if serialization fails and
    /// [`Error::Io`] if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::Configuration(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// The save path selected by `soft_delete`.
    pub fn persist_mode(&self) -> PersistMode {
        PersistMode::from_soft_delete(self.soft_delete)
    }
}
