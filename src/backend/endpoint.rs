//! Endpoint parsing and connection.
//!
//! Endpoints have the form `scheme://location`:
//! - `memory://` - fresh in-process store (location ignored)
//! - `file://<path>` - snapshot file at `<path>`; `file:///abs/path` and
//!   `file://relative/path` are both accepted

use crate::backend::{Backend, FileBackend, MemoryBackend, PoolGate};
use crate::core::config::BackendConfig;
use crate::core::error::{BackendError, BackendResult};
use crate::core::runtime::ShutdownContext;
use std::path::PathBuf;
use std::sync::Arc;

/// Backend kinds this build can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Memory,
    File,
}

impl Scheme {
    /// Scheme name as written in endpoints.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Backend kind.
    pub scheme: Scheme,
    /// Everything after `://`.
    pub location: String,
}

impl Endpoint {
    /// Parse an endpoint string.
    pub fn parse(endpoint: &str) -> BackendResult<Self> {
        let (scheme, location) =
            endpoint
                .split_once("://")
                .ok_or_else(|| BackendError::InvalidRequest {
                    message: format!("endpoint must have the form scheme://location: {}", endpoint),
                })?;

        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "memory" => Scheme::Memory,
            "file" => Scheme::File,
            _ => {
                return Err(BackendError::UnsupportedEndpoint {
                    endpoint: endpoint.to_string(),
                })
            }
        };

        if scheme == Scheme::File && location.is_empty() {
            return Err(BackendError::invalid("file endpoint requires a path"));
        }

        Ok(Self {
            scheme,
            location: location.to_string(),
        })
    }

    /// Filesystem path for `file://` endpoints.
    pub fn path(&self) -> Option<PathBuf> {
        (self.scheme == Scheme::File).then(|| PathBuf::from(&self.location))
    }
}

impl std::str::FromStr for Endpoint {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.location)
    }
}

/// Open a backend for `config`, registering its background work with `ctx`.
pub async fn connect(
    config: &BackendConfig,
    ctx: &ShutdownContext,
) -> BackendResult<Arc<dyn Backend>> {
    let endpoint = Endpoint::parse(&config.endpoint)?;
    let gate = PoolGate::from_config(&config.pool);

    if config.transport.has_tls_material() {
        tracing::warn!(
            endpoint = %endpoint,
            "TLS settings do not apply to in-process backends and are ignored"
        );
    }

    tracing::debug!(
        endpoint = %endpoint,
        max_open = ?gate.limit(),
        skip_verify = config.transport.skip_verify,
        "connecting backend"
    );

    let backend: Arc<dyn Backend> = match endpoint.scheme {
        Scheme::Memory => {
            let mut backend = MemoryBackend::new().with_gate(gate);
            backend.start(ctx, &config.compaction);
            Arc::new(backend)
        }
        Scheme::File => {
            let path = endpoint
                .path()
                .ok_or_else(|| BackendError::invalid("file endpoint requires a path"))?;
            Arc::new(FileBackend::open(path, ctx, &config.compaction, gate).await?)
        }
    };

    tracing::info!(endpoint = %endpoint, backend = backend.name(), "backend connected");
    Ok(backend)
}
