//! Logging setup.
//!
//! The subscriber is built from an explicit [`LogConfig`] at startup. The
//! migration code only emits `tracing` events and never reads or mutates
//! logging state itself.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity levels, lowest to highest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    /// Includes per-query backend logging.
    Trace,
}

impl LogLevel {
    /// Level name as understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Resolve the `--debug` / `--trace` flags. Trace wins over debug.
    pub fn from_flags(debug: bool, trace: bool) -> Option<Self> {
        match (debug, trace) {
            (_, true) => Some(Self::Trace),
            (true, false) => Some(Self::Debug),
            (false, false) => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum level emitted.
    #[serde(default)]
    pub level: LogLevel,

    /// Include event targets in output.
    #[serde(default)]
    pub target: bool,
}

impl LogConfig {
    /// Filter for this configuration. `RUST_LOG` takes precedence when set.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }
}

/// Install the global subscriber.
///
/// Fails if a subscriber has already been installed.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(config.target))
        .with(config.env_filter())
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))
}
