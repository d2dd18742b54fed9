//! Error types for backends and the migration driver.
//!
//! [`BackendError`] is what a store reports through the backend contract.
//! [`MigrateError`] is what the driver reports to its caller. Only
//! [`BackendError::AlreadyExists`] is ever handled inside the driver.

use crate::backend::BackendRole;
use thiserror::Error;

/// Errors reported by a key-value backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Create was called for a key that is already present.
    #[error("key already exists: {key}")]
    AlreadyExists { key: String },

    /// Update was called for a key that is not present.
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// Requested revision has been compacted.
    #[error("revision {revision} has been compacted; compaction floor is {compaction_floor}")]
    Compacted { revision: i64, compaction_floor: i64 },

    /// Requested revision is newer than the store.
    #[error("revision {revision} is in the future; current revision is {current}")]
    FutureRevision { revision: i64, current: i64 },

    /// Endpoint scheme has no backend implementation.
    #[error("unsupported endpoint: {endpoint}")]
    UnsupportedEndpoint { endpoint: String },

    /// Malformed request or endpoint.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Store could not be reached.
    #[error("backend unavailable: {message}")]
    Unavailable { message: String },

    /// Store has been shut down.
    #[error("backend closed")]
    Closed,

    /// Persistence failure.
    #[error("i/o error: {message}")]
    Io { message: String },
}

impl BackendError {
    /// Create an AlreadyExists error for a raw key.
    pub fn already_exists(key: &[u8]) -> Self {
        Self::AlreadyExists {
            key: String::from_utf8_lossy(key).into_owned(),
        }
    }

    /// Create a NotFound error for a raw key.
    pub fn not_found(key: &[u8]) -> Self {
        Self::NotFound {
            key: String::from_utf8_lossy(key).into_owned(),
        }
    }

    /// Create an InvalidRequest error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an Unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create an Io error with context.
    pub fn io(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Io {
            message: format!("{}: {}", context, err),
        }
    }

    /// Check if this is the recoverable create conflict.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Check if the key was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type using BackendError.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced by a migration run.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// A backend endpoint could not be opened.
    #[error("failed to connect {role} backend at {endpoint}")]
    Connection {
        role: BackendRole,
        endpoint: String,
        #[source]
        source: BackendError,
    },

    /// Source enumeration failed.
    #[error("failed to list source entries")]
    List {
        #[source]
        source: BackendError,
    },

    /// Writing a key to the destination failed. `copied` entries were
    /// written before it.
    #[error("failed to copy key {key} after {copied} entries")]
    Write {
        key: String,
        copied: usize,
        #[source]
        source: BackendError,
    },

    /// One or more background tasks did not stop cleanly.
    #[error("shutdown failed: {message}")]
    Shutdown { message: String },

    /// The run was interrupted on purpose.
    #[error("migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Write error for a raw key.
    pub fn write(key: &[u8], copied: usize, source: BackendError) -> Self {
        Self::Write {
            key: String::from_utf8_lossy(key).into_owned(),
            copied,
            source,
        }
    }

    /// Check if this is a deliberate cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Number of entries written before the error, if the copy had started.
    pub fn copied(&self) -> Option<usize> {
        match self {
            Self::Write { copied, .. } => Some(*copied),
            _ => None,
        }
    }
}

/// Result type using MigrateError.
pub type MigrateResult<T> = Result<T, MigrateError>;
