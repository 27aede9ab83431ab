//! CLI argument structs for all commands.

use clap::{Args, Parser, ValueEnum};

use crate::engine::TargetOrder;

/// Arguments for the `graph` command
#[derive(Parser, Debug, Clone, Default)]
pub struct GraphArgs {}

/// Position of the target relative to its dependents
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOrderArg {
    /// Delete dependents first, then the target
    Last,
    /// Delete the target first, then its dependents
    First,
}

impl From<TargetOrderArg> for TargetOrder {
    fn from(arg: TargetOrderArg) -> Self {
        match arg {
            TargetOrderArg::Last => TargetOrder::Last,
            TargetOrderArg::First => TargetOrder::First,
        }
    }
}

/// Options shared by every command that plans a purge
#[derive(Args, Debug, Clone, Default)]
pub struct PlanOptions {
    /// Accept any table as the target, not only tables nothing references
    #[arg(long)]
    pub any_table: bool,

    /// Whether the target is deleted before or after its dependents
    #[arg(long, value_enum)]
    pub target_order: Option<TargetOrderArg>,
}

/// Arguments for the `plan` command
#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    /// Table to purge
    pub table: String,

    #[command(flatten)]
    pub options: PlanOptions,
}

/// Arguments for the `purge` command
#[derive(Parser, Debug, Clone)]
pub struct PurgeArgs {
    /// Table to purge
    pub table: String,

    /// SQL `WHERE` expression selecting the target's rows (all rows if omitted)
    ///
    /// Dependent tables are always purged in full.
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Persist deletes through the asynchronous save path
    #[arg(long)]
    pub soft_delete: bool,

    /// Count the rows that would be deleted and roll back
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub options: PlanOptions,
}
