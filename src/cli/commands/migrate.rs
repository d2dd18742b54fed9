//! Migrate command implementation.

use crate::cli::Cli;
use crate::core::config::Config;
use crate::core::error::MigrateResult;
use crate::core::logging;
use crate::core::runtime::Runtime;
use crate::migrate::{MigrationPhase, MigrationReport};
use anyhow::{Context, Result};

/// Load configuration for the parsed command line.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config {
        Some(ref path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_overrides(&cli.overrides());
    Ok(config)
}

/// Run a migration. A cancelled run is not an error.
pub async fn run_migrate(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    logging::init(&config.logging)?;

    let mut runtime = Runtime::new(config)?;
    let result = runtime.run().await;
    conclude(result, runtime.phase())
}

/// Map a finished run to the process result. Only cancellation is benign.
pub fn conclude(result: MigrateResult<MigrationReport>, phase: MigrationPhase) -> Result<()> {
    match result {
        Ok(report) => {
            tracing::info!(
                listed = report.listed,
                created = report.created,
                overwritten = report.overwritten,
                snapshot_revision = report.snapshot_revision,
                "migration complete"
            );
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            tracing::warn!("migration cancelled");
            Ok(())
        }
        Err(e) => {
            let err = anyhow::Error::from(e);
            tracing::error!(error = %format_args!("{:#}", err), %phase, "migration failed");
            Err(err)
        }
    }
}
