//! CLI argument parsing and command dispatch.
//!
//! # Commands
//!
//! - `graph`: Print every table in purge order
//! - `plan`: Print the steps a purge would take
//! - `purge`: Purge a table and everything that depends on it
//!
//! # Global Flags
//!
//! - `--database`: SQLite database to operate on
//! - `--config`: YAML configuration file
//! - `--json`: Output in JSON format
//!
//! # Example
//!
//! ```bash
//! fkpurge --database shop.db graph
//! fkpurge --database shop.db plan customers
//! fkpurge --database shop.db purge customers --filter "id = 42"
//! ```

mod args;
mod execute;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use args::{GraphArgs, PlanArgs, PlanOptions, PurgeArgs, TargetOrderArg};

/// fkpurge - purge rows in foreign-key dependency order
///
/// Deletes rows from a table together with every row that depends on them,
/// in one transaction, without violating referential integrity.
#[derive(Parser, Debug)]
#[command(name = "fkpurge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// SQLite database file
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print every table in purge order
    ///
    /// Tables are listed deepest dependents first, each with the tables that
    /// reference it directly.
    Graph(GraphArgs),

    /// Show the steps a purge would take
    ///
    /// Touches no data.
    Plan(PlanArgs),

    /// Purge a table and everything that depends on it
    ///
    /// Deletes the target's rows matching `--filter` and every row of every
    /// dependent table, in one transaction.
    Purge(PurgeArgs),
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        use crate::app::App;
        use crate::output::OutputMode;

        let output_mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        let database = self
            .database
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No database given; pass --database <path>"))?;
        let app = App::open(database, self.config.as_deref()).await?;

        match &self.command {
            Commands::Graph(args) => execute::execute_graph(&app, args, output_mode),
            Commands::Plan(args) => execute::execute_plan(&app, args, output_mode),
            Commands::Purge(args) => execute::execute_purge(&app, args, output_mode).await,
        }
    }
}
