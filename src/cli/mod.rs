//! Command-line interface.

pub mod commands;

use crate::core::config::ConfigOverrides;
use crate::core::logging::LogLevel;
use clap::Parser;
use std::path::PathBuf;

/// Migrate data from one key-value backend to another.
#[derive(Parser, Debug)]
#[command(name = "kvmigrate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Source backend endpoint.
    #[arg(long, value_name = "ENDPOINT", required_unless_present = "config")]
    pub from: Option<String>,

    /// Destination backend endpoint.
    #[arg(long, value_name = "ENDPOINT", required_unless_present = "config")]
    pub to: Option<String>,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,

    /// Enable query logging.
    #[arg(long)]
    pub trace: bool,

    /// Configuration file path.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verify backend TLS certificates.
    #[arg(long)]
    pub tls_verify: bool,

    /// Maximum concurrent operations per backend (0 = unlimited).
    #[arg(long, value_name = "N")]
    pub max_open_connections: Option<usize>,
}

impl Cli {
    /// Configuration overrides implied by the flags.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            from: self.from.clone(),
            to: self.to.clone(),
            log_level: LogLevel::from_flags(self.debug, self.trace),
            skip_verify: self.tls_verify.then_some(false),
            max_open: self.max_open_connections,
        }
    }
}
