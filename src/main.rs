//! kvmigrate - CLI entrypoint.
//!
//! Usage:
//!   kvmigrate --from <endpoint> --to <endpoint> [--debug] [--trace]
//!   kvmigrate --config migrate.toml

use anyhow::Result;
use clap::Parser;
use kvmigrate::cli::commands::run_migrate;
use kvmigrate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run_migrate(cli).await
}
