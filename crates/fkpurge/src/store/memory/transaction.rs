//! StoreTransaction implementation for the in-memory store.

use super::inner::{find_violation, DeleteEvent, MemoryDatabase, MemoryTable};
use crate::domain::{RowKey, TableKey};
use crate::error::{Error, Result};
use crate::filter::{Predicate, RowFilter};
use crate::store::{RowSource, StoreTransaction};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::OwnedMutexGuard;

/// An open transaction over a [`super::MemoryStore`].
///
/// Holds the store's lock for its whole lifetime, so transactions are
/// serialized. All work happens on `working`, a copy of the committed tables.
pub(crate) struct MemoryTransaction {
    state: OwnedMutexGuard<MemoryDatabase>,
    working: HashMap<TableKey, MemoryTable>,
    pending: Vec<(RowSource, Vec<RowKey>)>,
    log: Vec<DeleteEvent>,
}

impl MemoryTransaction {
    pub(crate) fn new(state: OwnedMutexGuard<MemoryDatabase>) -> Self {
        let working = state.tables.clone();
        Self {
            state,
            working,
            pending: Vec::new(),
            log: Vec::new(),
        }
    }

    fn matching(&self, source: &RowSource, filter: Option<&RowFilter>) -> Result<Vec<RowKey>> {
        let table = self
            .working
            .get(&source.entity.key())
            .ok_or_else(|| Error::persistence(&source.entity, "table does not exist"))?;

        let predicate = match filter {
            Some(filter) => filter.parse()?,
            None => Predicate::Always,
        };

        let mut keys = Vec::new();
        for (key, row) in &table.rows {
            let lookup = |column: &str| row.get(column.to_ascii_lowercase().as_str());
            if predicate.matches(&lookup)? {
                keys.push(*key);
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn select_keys(
        &mut self,
        source: &RowSource,
        filter: Option<&RowFilter>,
    ) -> Result<Vec<RowKey>> {
        self.matching(source, filter)
    }

    async fn count_rows(
        &mut self,
        source: &RowSource,
        filter: Option<&RowFilter>,
    ) -> Result<u64> {
        Ok(self.matching(source, filter)?.len() as u64)
    }

    fn stage_removal(&mut self, source: &RowSource, keys: Vec<RowKey>) {
        self.pending.push((source.clone(), keys));
    }

    fn save_changes(&mut self) -> Result<u64> {
        let mut removed_total = 0;

        for (source, keys) in std::mem::take(&mut self.pending) {
            let key = source.entity.key();
            if self.state.faults.contains(&key) {
                return Err(Error::persistence(&source.entity, "injected save failure"));
            }

            let table = self
                .working
                .get_mut(&key)
                .ok_or_else(|| Error::persistence(&source.entity, "table does not exist"))?;

            let removed = keys
                .iter()
                .filter(|row_key| table.rows.remove(*row_key).is_some())
                .count() as u64;

            self.log.push(DeleteEvent {
                table: table.name.clone(),
                rows: removed,
            });
            removed_total += removed;
        }

        Ok(removed_total)
    }

    async fn save_changes_async(&mut self) -> Result<u64> {
        tokio::task::yield_now().await;
        self.save_changes()
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        if let Some(violation) = find_violation(&self.working, &self.state.foreign_keys) {
            tracing::debug!(%violation, "Foreign key check failed at commit");
            return Err(Error::ConstraintViolation(violation));
        }

        let working = std::mem::take(&mut self.working);
        let log = std::mem::take(&mut self.log);
        self.state.tables = working;
        self.state.history.extend(log);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        tracing::trace!(
            discarded = self.log.len(),
            "Rolling back in-memory transaction"
        );
        Ok(())
    }
}
