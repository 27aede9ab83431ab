//! fkpurge CLI binary.

use anyhow::Result;
use fkpurge::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the fkpurge CLI.
///
/// A purge is a sequence of dependent round-trips, so the current-thread
/// runtime is enough.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Controlled via RUST_LOG, e.g. RUST_LOG=fkpurge=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fkpurge=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting fkpurge CLI");

    let cli = Cli::parse_args();
    cli.execute().await?;

    tracing::debug!("fkpurge CLI completed successfully");
    Ok(())
}
