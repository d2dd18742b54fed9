//! Configuration parsing and validation.
//!
//! Configuration is loaded from an optional TOML file, then CLI overrides are
//! applied on top, then the result is validated. Both backends share the
//! transport, pool, and compaction sections.

use crate::backend::{BackendRole, Endpoint};
use crate::core::logging::{LogConfig, LogLevel};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level migration configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Store the entries are read from.
    #[serde(default)]
    pub source: EndpointConfig,

    /// Store the entries are written to.
    #[serde(default)]
    pub destination: EndpointConfig,

    /// Transport options applied to both backends.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Connection pool sizing applied to both backends.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Background compaction for in-process stores.
    #[serde(default)]
    pub compaction: CompactionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LogConfig,

    /// Runtime behaviour.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// A single backend endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint URI, e.g. `memory://` or `file:///var/lib/store.db`.
    #[serde(default)]
    pub endpoint: String,
}

/// Transport-level options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Skip server certificate verification.
    #[serde(default = "default_skip_verify")]
    pub skip_verify: bool,

    /// CA bundle path.
    #[serde(default)]
    pub ca_file: Option<String>,

    /// Client certificate path.
    #[serde(default)]
    pub cert_file: Option<String>,

    /// Client private key path.
    #[serde(default)]
    pub key_file: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            skip_verify: default_skip_verify(),
            ca_file: None,
            cert_file: None,
            key_file: None,
        }
    }
}

impl TransportConfig {
    /// Check if any TLS material is configured.
    pub fn has_tls_material(&self) -> bool {
        self.ca_file.is_some() || self.cert_file.is_some() || self.key_file.is_some()
    }
}

/// Connection pool sizing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum concurrent operations per backend (0 = unlimited).
    #[serde(default)]
    pub max_open: usize,
}

/// Background compaction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Compaction period in milliseconds (0 disables compaction).
    #[serde(default = "default_compact_interval_ms")]
    pub interval_ms: u64,

    /// Number of most recent revisions that are never compacted.
    #[serde(default = "default_compact_min_retain")]
    pub min_retain: i64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_compact_interval_ms(),
            min_retain: default_compact_min_retain(),
        }
    }
}

impl CompactionConfig {
    /// Compaction period, or `None` when disabled.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_ms > 0).then(|| Duration::from_millis(self.interval_ms))
    }
}

/// Runtime behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// How long to wait for backends to acknowledge shutdown.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl RuntimeConfig {
    /// Shutdown acknowledgment timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Everything needed to open one backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Endpoint URI.
    pub endpoint: String,
    /// Transport options.
    pub transport: TransportConfig,
    /// Pool sizing.
    pub pool: PoolConfig,
    /// Compaction settings.
    pub compaction: CompactionConfig,
}

impl BackendConfig {
    /// Backend config with default transport, pool, and compaction settings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport: TransportConfig::default(),
            pool: PoolConfig::default(),
            compaction: CompactionConfig::default(),
        }
    }
}

// Default value functions

fn default_skip_verify() -> bool {
    true
}

fn default_compact_interval_ms() -> u64 {
    300_000
}

fn default_compact_min_retain() -> i64 {
    1_000
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

impl Config {
    /// Configuration with the given endpoints and defaults elsewhere.
    pub fn for_endpoints(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            source: EndpointConfig {
                endpoint: from.into(),
            },
            destination: EndpointConfig {
                endpoint: to.into(),
            },
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// The result is not validated; endpoints may still come from CLI
    /// overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content).with_context(|| "failed to parse config file")
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref from) = overrides.from {
            self.source.endpoint = from.clone();
        }
        if let Some(ref to) = overrides.to {
            self.destination.endpoint = to.clone();
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(skip_verify) = overrides.skip_verify {
            self.transport.skip_verify = skip_verify;
        }
        if let Some(max_open) = overrides.max_open {
            self.pool.max_open = max_open;
        }
    }

    /// Build the connection settings for one side of the migration.
    pub fn backend_config(&self, role: BackendRole) -> BackendConfig {
        let endpoint = match role {
            BackendRole::Source => &self.source.endpoint,
            BackendRole::Destination => &self.destination.endpoint,
        };
        BackendConfig {
            endpoint: endpoint.clone(),
            transport: self.transport.clone(),
            pool: self.pool.clone(),
            compaction: self.compaction.clone(),
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_endpoint("source", &self.source.endpoint)?;
        self.validate_endpoint("destination", &self.destination.endpoint)?;
        self.validate_transport()?;
        self.validate_compaction()?;

        if self.runtime.shutdown_timeout_ms == 0 {
            anyhow::bail!("runtime.shutdown_timeout_ms must be > 0");
        }

        Ok(())
    }

    fn validate_endpoint(&self, section: &str, endpoint: &str) -> Result<()> {
        if endpoint.is_empty() {
            anyhow::bail!(
                "{}.endpoint is required (set it in the config file or pass --{})",
                section,
                if section == "source" { "from" } else { "to" }
            );
        }
        Endpoint::parse(endpoint).with_context(|| format!("invalid {}.endpoint", section))?;
        Ok(())
    }

    fn validate_transport(&self) -> Result<()> {
        // Client certificate and key come as a pair
        match (&self.transport.cert_file, &self.transport.key_file) {
            (Some(_), None) => {
                anyhow::bail!("transport.key_file required when transport.cert_file is set");
            }
            (None, Some(_)) => {
                anyhow::bail!("transport.cert_file required when transport.key_file is set");
            }
            _ => {}
        }
        Ok(())
    }

    fn validate_compaction(&self) -> Result<()> {
        if self.compaction.min_retain < 0 {
            anyhow::bail!(
                "compaction.min_retain must be >= 0, got: {}",
                self.compaction.min_retain
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override source endpoint.
    pub from: Option<String>,
    /// Override destination endpoint.
    pub to: Option<String>,
    /// Override log level.
    pub log_level: Option<LogLevel>,
    /// Override certificate verification.
    pub skip_verify: Option<bool>,
    /// Override pool size.
    pub max_open: Option<usize>,
}
