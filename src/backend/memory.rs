//! In-process MVCC store.
//!
//! [`MemoryStore`] keeps every version of every key since the compaction
//! floor, so `list` can answer at any retained revision. The revision
//! counter is store-wide: every successful create or update bumps it by one
//! and stamps the written entry with the new value.
//!
//! [`MemoryBackend`] wraps a store behind the [`Backend`] trait and, once
//! started, runs a background compactor until shutdown.

use crate::backend::{Backend, KeyPattern, KeyValue, ListResult, PoolGate, UpdateResult};
use crate::core::config::CompactionConfig;
use crate::core::error::{BackendError, BackendResult};
use crate::core::runtime::{ShutdownContext, ShutdownSignal};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Versioned key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Current store revision.
    current_revision: i64,

    /// Oldest revision still readable.
    compaction_floor: i64,

    /// key → versions, oldest first. Never empty.
    index: BTreeMap<Vec<u8>, Vec<KeyValue>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current revision.
    pub fn current_revision(&self) -> i64 {
        self.current_revision
    }

    /// Get the compaction floor.
    pub fn compaction_floor(&self) -> i64 {
        self.compaction_floor
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Get a key's current entry.
    pub fn get(&self, key: &[u8]) -> Option<&KeyValue> {
        self.index.get(key).and_then(|versions| versions.last())
    }

    /// Total number of retained versions across all keys.
    pub fn version_count(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    /// List matching entries as of `revision` (0 = current).
    pub fn list(
        &self,
        pattern: &KeyPattern,
        start_key: &[u8],
        limit: usize,
        revision: i64,
    ) -> BackendResult<ListResult> {
        let revision = self.resolve_revision(revision)?;

        let prefix = pattern.literal_prefix();
        let seek = if start_key > prefix.as_slice() {
            start_key.to_vec()
        } else {
            prefix.clone()
        };

        let mut kvs = Vec::new();
        for (key, versions) in self.index.range(seek..) {
            if !key.starts_with(&prefix) {
                break;
            }
            if !pattern.matches(key) {
                continue;
            }
            // Latest version written at or before the requested revision
            if let Some(kv) = versions.iter().rev().find(|kv| kv.mod_revision <= revision) {
                kvs.push(kv.clone());
                if limit > 0 && kvs.len() >= limit {
                    break;
                }
            }
        }

        Ok(ListResult { revision, kvs })
    }

    fn resolve_revision(&self, revision: i64) -> BackendResult<i64> {
        if revision == 0 {
            return Ok(self.current_revision);
        }
        if revision < 0 {
            return Err(BackendError::invalid(format!(
                "revision must be >= 0, got {}",
                revision
            )));
        }
        if revision < self.compaction_floor {
            return Err(BackendError::Compacted {
                revision,
                compaction_floor: self.compaction_floor,
            });
        }
        if revision > self.current_revision {
            return Err(BackendError::FutureRevision {
                revision,
                current: self.current_revision,
            });
        }
        Ok(revision)
    }

    /// Insert a new key.
    pub fn create(&mut self, key: &[u8], value: &[u8], lease: i64) -> BackendResult<i64> {
        validate_key(key)?;
        if self.index.contains_key(key) {
            return Err(BackendError::already_exists(key));
        }

        let revision = self.current_revision + 1;
        let kv = KeyValue {
            key: key.to_vec(),
            value: value.to_vec(),
            create_revision: revision,
            mod_revision: revision,
            lease,
        };
        self.index.insert(key.to_vec(), vec![kv]);
        self.current_revision = revision;
        Ok(revision)
    }

    /// Replace an existing key's value, optionally checking its revision.
    pub fn update(
        &mut self,
        key: &[u8],
        value: &[u8],
        expected_revision: i64,
        lease: i64,
    ) -> BackendResult<UpdateResult> {
        validate_key(key)?;
        let next_revision = self.current_revision + 1;
        let current_revision = self.current_revision;

        let versions = self
            .index
            .get_mut(key)
            .ok_or_else(|| BackendError::not_found(key))?;
        let prev = versions
            .last()
            .cloned()
            .ok_or_else(|| BackendError::not_found(key))?;

        if expected_revision != 0 && expected_revision != prev.mod_revision {
            return Ok(UpdateResult {
                revision: current_revision,
                prev_kv: Some(prev),
                updated: false,
            });
        }

        versions.push(KeyValue {
            key: key.to_vec(),
            value: value.to_vec(),
            create_revision: prev.create_revision,
            mod_revision: next_revision,
            lease,
        });
        self.current_revision = next_revision;

        Ok(UpdateResult {
            revision: next_revision,
            prev_kv: Some(prev),
            updated: true,
        })
    }

    /// Discard versions no longer needed to answer reads at `revision` or later.
    ///
    /// Returns the number of versions removed.
    pub fn compact(&mut self, revision: i64) -> usize {
        if revision <= self.compaction_floor {
            return 0;
        }
        let revision = revision.min(self.current_revision);

        let mut removed = 0;
        for versions in self.index.values_mut() {
            // Keep the newest version at or below the floor; older ones are unreachable.
            let visible_at_floor = versions
                .iter()
                .rposition(|kv| kv.mod_revision <= revision)
                .unwrap_or(0);
            removed += visible_at_floor;
            versions.drain(..visible_at_floor);
        }

        self.compaction_floor = revision;
        removed
    }

    /// Compact everything except the most recent `min_retain` revisions.
    pub fn compact_retaining(&mut self, min_retain: i64) -> usize {
        let target = self.current_revision - min_retain;
        if target <= self.compaction_floor {
            return 0;
        }
        self.compact(target)
    }

    /// Capture the current entries.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            revision: self.current_revision,
            records: self
                .index
                .values()
                .filter_map(|versions| versions.last().cloned())
                .collect(),
        }
    }

    /// Rebuild a store from a snapshot.
    ///
    /// History is not part of a snapshot, so the compaction floor starts at
    /// the snapshot revision.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let index = snapshot
            .records
            .into_iter()
            .map(|kv| (kv.key.clone(), vec![kv]))
            .collect();

        Self {
            current_revision: snapshot.revision,
            compaction_floor: snapshot.revision,
            index,
        }
    }
}

fn validate_key(key: &[u8]) -> BackendResult<()> {
    if key.is_empty() {
        return Err(BackendError::invalid("key must not be empty"));
    }
    Ok(())
}

/// Current entries of a store at one revision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Store revision at snapshot time.
    pub revision: i64,
    /// Current entry of every key, ascending by key.
    pub records: Vec<KeyValue>,
}

impl StoreSnapshot {
    /// Serialize with bincode.
    pub fn to_bytes(&self) -> BackendResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| BackendError::io("failed to encode snapshot", e))
    }

    /// Deserialize from bincode.
    pub fn from_bytes(bytes: &[u8]) -> BackendResult<Self> {
        bincode::deserialize(bytes).map_err(|e| BackendError::io("failed to decode snapshot", e))
    }
}

/// [`Backend`] over a shared [`MemoryStore`].
#[derive(Clone)]
pub struct MemoryBackend {
    store: Arc<RwLock<MemoryStore>>,
    gate: PoolGate,
    shutdown: Option<ShutdownSignal>,
}

impl MemoryBackend {
    /// Create a backend over an empty store with no limits and no background work.
    pub fn new() -> Self {
        Self::from_store(MemoryStore::new())
    }

    /// Create a backend over an existing store.
    pub fn from_store(store: MemoryStore) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            gate: PoolGate::unlimited(),
            shutdown: None,
        }
    }

    /// Limit concurrent operations.
    pub fn with_gate(mut self, gate: PoolGate) -> Self {
        self.gate = gate;
        self
    }

    /// Tie this backend to a shutdown context and start background compaction.
    ///
    /// After shutdown is requested every operation fails with `Closed`.
    pub fn start(&mut self, ctx: &ShutdownContext, compaction: &CompactionConfig) {
        self.shutdown = Some(ctx.signal());

        let Some(period) = compaction.interval() else {
            tracing::debug!("background compaction disabled");
            return;
        };

        let store = Arc::clone(&self.store);
        let min_retain = compaction.min_retain;
        let mut signal = ctx.signal();
        ctx.spawn("memory-compactor", async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = signal.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.write().compact_retaining(min_retain);
                        if removed > 0 {
                            tracing::debug!(removed, "compacted store history");
                        }
                    }
                }
            }
            Ok(())
        });
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> Arc<RwLock<MemoryStore>> {
        Arc::clone(&self.store)
    }

    /// Get a key's current entry.
    pub fn get(&self, key: &[u8]) -> Option<KeyValue> {
        self.store.read().get(key).cloned()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    /// Check if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    /// Capture the current entries.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.read().snapshot()
    }

    fn ensure_open(&self) -> BackendResult<()> {
        match &self.shutdown {
            Some(signal) if signal.is_cancelled() => Err(BackendError::Closed),
            _ => Ok(()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(
        &self,
        pattern: &str,
        start_key: &[u8],
        limit: usize,
        revision: i64,
    ) -> BackendResult<ListResult> {
        self.ensure_open()?;
        let _permit = self.gate.acquire().await?;
        tracing::trace!(
            backend = self.name(),
            pattern,
            start_key = %String::from_utf8_lossy(start_key),
            limit,
            revision,
            "LIST"
        );
        self.store
            .read()
            .list(&KeyPattern::parse(pattern), start_key, limit, revision)
    }

    async fn create(&self, key: &[u8], value: &[u8], lease: i64) -> BackendResult<i64> {
        self.ensure_open()?;
        let _permit = self.gate.acquire().await?;
        tracing::trace!(
            backend = self.name(),
            key = %String::from_utf8_lossy(key),
            value_len = value.len(),
            lease,
            "CREATE"
        );
        self.store.write().create(key, value, lease)
    }

    async fn update(
        &self,
        key: &[u8],
        value: &[u8],
        expected_revision: i64,
        lease: i64,
    ) -> BackendResult<UpdateResult> {
        self.ensure_open()?;
        let _permit = self.gate.acquire().await?;
        tracing::trace!(
            backend = self.name(),
            key = %String::from_utf8_lossy(key),
            value_len = value.len(),
            expected_revision,
            lease,
            "UPDATE"
        );
        self.store
            .write()
            .update(key, value, expected_revision, lease)
    }
}
