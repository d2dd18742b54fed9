//! Backend contract.
//!
//! A backend is any versioned key-value store that can enumerate its
//! entries, create a key that must not exist yet, and update a key under an
//! optimistic revision check. The migration driver uses the same
//! [`Backend`] trait for both the source and the destination role.
//!
//! - [`memory`] - In-process MVCC store
//! - [`file`] - In-process store persisted as a snapshot file
//! - [`endpoint`] - Endpoint parsing and connection
//! - [`pattern`] - Key pattern matching for `list`
//! - [`pool`] - Concurrency limit for backend operations

pub mod endpoint;
pub mod file;
pub mod memory;
pub mod pattern;
pub mod pool;

pub use endpoint::{connect, Endpoint, Scheme};
pub use file::FileBackend;
pub use memory::{MemoryBackend, MemoryStore, StoreSnapshot};
pub use pattern::KeyPattern;
pub use pool::PoolGate;

use crate::core::error::BackendResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Pattern that matches every key.
pub const MATCH_ALL: &str = "%";

/// A key-value entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Key.
    pub key: Vec<u8>,
    /// Value.
    pub value: Vec<u8>,
    /// Revision when created.
    pub create_revision: i64,
    /// Revision of last modification.
    pub mod_revision: i64,
    /// Attached lease ID (0 = no lease).
    pub lease: i64,
}

impl KeyValue {
    /// Create an entry with no revision information and no lease.
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            create_revision: 0,
            mod_revision: 0,
            lease: 0,
        }
    }

    /// Attach a lease.
    pub fn with_lease(mut self, lease: i64) -> Self {
        self.lease = lease;
        self
    }

    /// Check if this entry is attached to a lease.
    pub fn has_lease(&self) -> bool {
        self.lease != 0
    }

    /// Key for display purposes.
    pub fn key_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }
}

/// Result of a `list` call.
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    /// Store revision the snapshot was taken at.
    pub revision: i64,
    /// Matching entries, ascending by key.
    pub kvs: Vec<KeyValue>,
}

/// Result of an `update` call.
#[derive(Debug, Clone)]
pub struct UpdateResult {
    /// New revision if updated, otherwise the store's current revision.
    pub revision: i64,
    /// Entry as it was before the call.
    pub prev_kv: Option<KeyValue>,
    /// False if the revision check failed and nothing changed.
    pub updated: bool,
}

/// Which side of a migration a backend serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendRole {
    Source,
    Destination,
}

impl std::fmt::Display for BackendRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Destination => write!(f, "destination"),
        }
    }
}

/// Operations a key-value store must expose to take part in a migration.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend kind, for logging.
    fn name(&self) -> &str;

    /// List entries whose key matches `pattern`.
    ///
    /// Starts at `start_key` (empty = beginning), returns at most `limit`
    /// entries (0 = unlimited), as of `revision` (0 = current). Entries are
    /// ascending by key and all come from one snapshot.
    async fn list(
        &self,
        pattern: &str,
        start_key: &[u8],
        limit: usize,
        revision: i64,
    ) -> BackendResult<ListResult>;

    /// Insert a new entry and return the revision it was written at.
    ///
    /// Fails with `AlreadyExists`, without mutating anything, if the key is
    /// present.
    async fn create(&self, key: &[u8], value: &[u8], lease: i64) -> BackendResult<i64>;

    /// Replace the value of an existing entry.
    ///
    /// `expected_revision == 0` skips the revision check. Fails with
    /// `NotFound` if the key is absent.
    async fn update(
        &self,
        key: &[u8],
        value: &[u8],
        expected_revision: i64,
        lease: i64,
    ) -> BackendResult<UpdateResult>;
}
