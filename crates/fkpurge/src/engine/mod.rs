//! Cascading purge engine.
//!
//! Given a table and a row filter, the engine removes the filtered rows of the
//! table together with *every* row of every table that transitively depends on
//! it, inside one transaction. Dependents are not filtered: rows that
//! referenced filtered-out target rows are removed too.
//!
//! # Lifecycle of a purge
//!
//! ```text
//! Idle -> GraphLookup -> ClosureCollection -> TransactionOpen
//!      -> Deleting(dependents[i]) ... -> Deleting(target)
//!      -> Committed | RolledBack
//! ```
//!
//! With [`TargetOrder::First`] the target is deleted before the dependents.
//! Any error or observed cancellation while deleting rolls the transaction
//! back, and the error is returned to the caller.
//!
//! # Lenient lookups
//!
//! A target missing from the graph is logged and purged without dependents. A
//! table with no row source is logged and reported as
//! [`DeleteOutcome::NotFound`]. Neither aborts the purge.

mod report;

pub use report::{
    DeleteOutcome, PurgePlan, PurgeReport, PurgeStep, StepKind, StepReport, TargetOrder,
};

use crate::cancel::CancellationFlag;
use crate::config::PurgeConfig;
use crate::domain::TableName;
use crate::error::{Error, Result};
use crate::filter::RowFilter;
use crate::graph::DependencyGraph;
use crate::store::{PersistMode, RowSourceRegistry, RowStore, StoreTransaction};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What to do with each step of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepAction {
    Delete,
    Count,
}

/// Purges rows in foreign-key dependency order.
///
/// The graph and store are shared; one engine can run purges from several
/// tasks, which the store serializes at `begin`.
pub struct PurgeEngine {
    graph: Arc<DependencyGraph>,
    store: Arc<dyn RowStore>,
    sources: RowSourceRegistry,
    config: PurgeConfig,
}

impl std::fmt::Debug for PurgeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurgeEngine")
            .field("graph", &self.graph)
            .field("sources", &self.sources.len())
            .field("config", &self.config)
            .field("store", &"<dyn RowStore>")
            .finish()
    }
}

impl PurgeEngine {
    /// Create an engine, resolving every table of `graph` against `store`.
    pub fn new(graph: Arc<DependencyGraph>, store: Arc<dyn RowStore>, config: PurgeConfig) -> Self {
        let sources = RowSourceRegistry::build(&graph, store.as_ref());

        info!(
            tables = graph.len(),
            row_sources = sources.len(),
            soft_delete = config.soft_delete,
            "Purge engine initialized"
        );

        Self {
            graph,
            store,
            sources,
            config,
        }
    }

    /// The dependency graph purges are planned on.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// The engine's configuration.
    pub fn config(&self) -> &PurgeConfig {
        &self.config
    }

    /// Row sources resolved at construction.
    pub fn sources(&self) -> &RowSourceRegistry {
        &self.sources
    }

    /// The steps a purge of `table` would take, in execution order.
    ///
    /// Performs no I/O. `table` is looked up under the configured
    /// [`EntryPointScope`](crate::graph::EntryPointScope); if it is not found
    /// the plan contains only the target step.
    pub fn plan(&self, table: &str) -> PurgePlan {
        let Some(vertex) = self.graph.lookup(table, self.config.entry_points) else {
            warn!(table, "Table not found in dependency graph; purging without dependents");
            let target = self
                .graph
                .find_anywhere(table)
                .map_or_else(|| TableName::new(table), |v| v.name().clone());
            return PurgePlan {
                steps: vec![PurgeStep {
                    table: target.clone(),
                    kind: StepKind::Target,
                }],
                target,
                found: false,
            };
        };

        let target = vertex.name().clone();
        let dependents = self
            .graph
            .dependent_closure(vertex)
            .into_iter()
            .map(|v| PurgeStep {
                table: v.name().clone(),
                kind: StepKind::Dependent,
            });
        let target_step = PurgeStep {
            table: target.clone(),
            kind: StepKind::Target,
        };

        let steps = match self.config.target_order {
            TargetOrder::Last => dependents.chain(std::iter::once(target_step)).collect(),
            TargetOrder::First => std::iter::once(target_step).chain(dependents).collect(),
        };

        debug!(table = %target, ?steps, "Planned purge");

        PurgePlan {
            target,
            found: true,
            steps,
        }
    }

    /// Remove the rows of `table` matching `filter` and every row of every
    /// table that depends on it, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` is observed, or the store's
    /// error if a read, save or commit fails. The transaction has been rolled
    /// back in every error case.
    pub async fn purge(
        &self,
        table: &str,
        filter: &RowFilter,
        cancel: &CancellationFlag,
    ) -> Result<PurgeReport> {
        info!(table, filter = %filter, "Starting purge");

        let report = self.run(table, filter, cancel, StepAction::Delete).await?;

        info!(
            table = %report.target,
            deleted = report.total_deleted(),
            "Purge completed"
        );
        Ok(report)
    }

    /// Count the rows a purge would remove, without removing anything.
    ///
    /// Runs inside a transaction that is always rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` is observed, or the store's
    /// error if a read fails.
    pub async fn preview(
        &self,
        table: &str,
        filter: &RowFilter,
        cancel: &CancellationFlag,
    ) -> Result<PurgeReport> {
        debug!(table, filter = %filter, "Previewing purge");
        self.run(table, filter, cancel, StepAction::Count).await
    }

    /// Delete the rows of `entity` matching `filter` inside `tx`.
    ///
    /// An empty (or absent) filter selects every row. Matching keys are staged
    /// and persisted through the save path chosen by `soft_delete`; nothing is
    /// persisted when no row matches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` is observed between the
    /// select and the save, or the store's error if either fails.
    pub async fn delete_rows(
        &self,
        tx: &mut dyn StoreTransaction,
        entity: &TableName,
        filter: Option<&RowFilter>,
        cancel: &CancellationFlag,
    ) -> Result<DeleteOutcome> {
        let Some(source) = self.sources.get(entity) else {
            warn!(table = %entity, "No row source for table; skipping");
            return Ok(DeleteOutcome::NotFound);
        };

        ensure_active(cancel)?;
        debug!(table = %entity, "Deleting rows");

        let keys = tx
            .select_keys(source, filter.and_then(RowFilter::as_option))
            .await?;
        if keys.is_empty() {
            info!(table = %entity, "No rows found");
            return Ok(DeleteOutcome::Deleted(0));
        }

        tx.stage_removal(source, keys);
        ensure_active(cancel)?;

        let deleted = match self.config.persist_mode() {
            PersistMode::Synchronous => tx.save_changes()?,
            PersistMode::Asynchronous => tx.save_changes_async().await?,
        };

        info!(table = %entity, deleted, "Deleted rows");
        Ok(DeleteOutcome::Deleted(deleted))
    }

    async fn count_rows(
        &self,
        tx: &mut dyn StoreTransaction,
        entity: &TableName,
        filter: Option<&RowFilter>,
        cancel: &CancellationFlag,
    ) -> Result<DeleteOutcome> {
        let Some(source) = self.sources.get(entity) else {
            return Ok(DeleteOutcome::NotFound);
        };

        ensure_active(cancel)?;
        let rows = tx
            .count_rows(source, filter.and_then(RowFilter::as_option))
            .await?;
        Ok(DeleteOutcome::Deleted(rows))
    }

    async fn run(
        &self,
        table: &str,
        filter: &RowFilter,
        cancel: &CancellationFlag,
        action: StepAction,
    ) -> Result<PurgeReport> {
        let plan = self.plan(table);

        ensure_active(cancel)?;
        let mut tx = self.store.begin().await?;

        let steps = match self.run_steps(tx.as_mut(), &plan, filter, cancel, action).await {
            Ok(steps) => steps,
            Err(e) => {
                error!(table = %plan.target, error = %e, "Purge failed; rolling back");
                rollback(tx).await;
                return Err(e);
            }
        };

        let report = PurgeReport {
            target: plan.target,
            steps,
        };

        if action == StepAction::Count {
            rollback(tx).await;
            return Ok(report);
        }

        if let Err(e) = ensure_active(cancel) {
            warn!(table = %report.target, "Purge cancelled before commit; rolling back");
            rollback(tx).await;
            return Err(e);
        }

        if let Err(e) = tx.commit().await {
            error!(table = %report.target, error = %e, "Commit failed");
            return Err(e);
        }

        Ok(report)
    }

    async fn run_steps(
        &self,
        tx: &mut dyn StoreTransaction,
        plan: &PurgePlan,
        filter: &RowFilter,
        cancel: &CancellationFlag,
        action: StepAction,
    ) -> Result<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(plan.steps.len());

        for step in &plan.steps {
            let step_filter = match step.kind {
                StepKind::Target => Some(filter),
                StepKind::Dependent => None,
            };

            let outcome = match action {
                StepAction::Delete => {
                    self.delete_rows(tx, &step.table, step_filter, cancel)
                        .await?
                }
                StepAction::Count => {
                    self.count_rows(tx, &step.table, step_filter, cancel)
                        .await?
                }
            };

            reports.push(StepReport {
                table: step.table.clone(),
                kind: step.kind,
                outcome,
            });
        }

        Ok(reports)
    }
}

fn ensure_active(cancel: &CancellationFlag) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Roll back, logging (not returning) a failure so the original error wins.
async fn rollback(tx: Box<dyn StoreTransaction>) {
    if let Err(e) = tx.rollback().await {
        error!(error = %e, "Rollback failed");
    }
}
