//! Command execution logic.

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::warn;

use super::args::{GraphArgs, PlanArgs, PlanOptions, PurgeArgs};
use crate::app::App;
use crate::cancel::CancellationFlag;
use crate::config::PurgeConfig;
use crate::filter::RowFilter;
use crate::graph::EntryPointScope;
use crate::output::{self, OutputMode};

/// Apply command-line overrides on top of the loaded configuration.
fn configure(base: PurgeConfig, options: &PlanOptions) -> PurgeConfig {
    let mut config = base;
    if options.any_table {
        config.entry_points = EntryPointScope::AnyTable;
    }
    if let Some(order) = options.target_order {
        config.target_order = order.into();
    }
    config
}

/// Raise `cancel` once `signal` resolves.
///
/// The purge notices the flag at its next check and rolls back.
fn cancel_on<F>(signal: F, cancel: CancellationFlag) -> JoinHandle<()>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                warn!("Interrupted; cancelling purge");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    })
}

/// Execute the graph command
pub fn execute_graph(app: &App, _args: &GraphArgs, output_mode: OutputMode) -> Result<()> {
    output::print_graph(app.graph(), output_mode)?;
    Ok(())
}

/// Execute the plan command
pub fn execute_plan(app: &App, args: &PlanArgs, output_mode: OutputMode) -> Result<()> {
    let engine = app.engine(configure(app.config(), &args.options));
    let plan = engine.plan(&args.table);
    output::print_plan(&plan, output_mode)?;
    Ok(())
}

/// Execute the purge command
pub async fn execute_purge(app: &App, args: &PurgeArgs, output_mode: OutputMode) -> Result<()> {
    let mut config = configure(app.config(), &args.options);
    if args.soft_delete {
        config.soft_delete = true;
    }

    let engine = app.engine(config);
    let filter = args
        .filter
        .as_deref()
        .map_or_else(RowFilter::all, RowFilter::new);
    let cancel = CancellationFlag::new();
    let interrupt = cancel_on(tokio::signal::ctrl_c(), cancel.clone());

    let result = if args.dry_run {
        engine.preview(&args.table, &filter, &cancel).await
    } else {
        engine.purge(&args.table, &filter, &cancel).await
    };
    interrupt.abort();
    let report = result?;

    output::print_report(&report, args.dry_run, output_mode)?;
    Ok(())
}
