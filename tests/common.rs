//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

use async_trait::async_trait;
use kvmigrate::backend::{Backend, KeyValue, ListResult, MemoryBackend, UpdateResult, MATCH_ALL};
use kvmigrate::core::config::Config;
use kvmigrate::error::{BackendError, BackendResult};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Create a memory backend holding the given string pairs.
pub async fn memory_backend_with(pairs: &[(&str, &str)]) -> Arc<MemoryBackend> {
    let backend = MemoryBackend::new();
    for (key, value) in pairs {
        backend
            .create(key.as_bytes(), value.as_bytes(), 0)
            .await
            .expect("Failed to seed backend");
    }
    Arc::new(backend)
}

/// Create a memory backend with `count` generated keys.
pub async fn populated_backend(count: usize) -> Arc<MemoryBackend> {
    let backend = MemoryBackend::new();
    for i in 0..count {
        let key = format!("key-{:05}", i);
        let value = format!("value-{}", i);
        backend
            .create(key.as_bytes(), value.as_bytes(), 0)
            .await
            .expect("Failed to seed backend");
    }
    Arc::new(backend)
}

/// Current content of a backend as a string map.
pub async fn contents(backend: &dyn Backend) -> BTreeMap<String, String> {
    backend
        .list(MATCH_ALL, &[], 0, 0)
        .await
        .expect("Failed to list backend")
        .kvs
        .into_iter()
        .map(|kv| {
            (
                String::from_utf8(kv.key).expect("utf-8 key"),
                String::from_utf8(kv.value).expect("utf-8 value"),
            )
        })
        .collect()
}

/// Build an expected string map.
pub fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Write a TOML config to a temp file.
pub fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Config for two in-process memory endpoints.
pub fn memory_config() -> Config {
    Config::for_endpoints("memory://", "memory://")
}

/// Which operation a [`FlakyBackend`] should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    List,
    Create,
    Update,
}

/// Backend wrapper that fails one operation for one key and counts writes.
pub struct FlakyBackend {
    inner: Arc<MemoryBackend>,
    fail_on: Option<(FailOn, Vec<u8>)>,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl FlakyBackend {
    /// Wrap a backend without injecting any failure.
    pub fn new(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            fail_on: None,
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }

    /// Fail `op` whenever it targets `key` (any key for `List`).
    pub fn failing(inner: Arc<MemoryBackend>, op: FailOn, key: &str) -> Self {
        Self {
            fail_on: Some((op, key.as_bytes().to_vec())),
            ..Self::new(inner)
        }
    }

    /// Number of create calls that reached the backend.
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of update calls that reached the backend.
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Total write calls.
    pub fn writes(&self) -> usize {
        self.creates() + self.updates()
    }

    fn injected(&self, op: FailOn, key: &[u8]) -> BackendResult<()> {
        match &self.fail_on {
            Some((fail_op, fail_key)) if *fail_op == op && (op == FailOn::List || fail_key == key) => {
                Err(BackendError::unavailable("injected failure"))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn list(
        &self,
        pattern: &str,
        start_key: &[u8],
        limit: usize,
        revision: i64,
    ) -> BackendResult<ListResult> {
        self.injected(FailOn::List, &[])?;
        self.inner.list(pattern, start_key, limit, revision).await
    }

    async fn create(&self, key: &[u8], value: &[u8], lease: i64) -> BackendResult<i64> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.injected(FailOn::Create, key)?;
        self.inner.create(key, value, lease).await
    }

    async fn update(
        &self,
        key: &[u8],
        value: &[u8],
        expected_revision: i64,
        lease: i64,
    ) -> BackendResult<UpdateResult> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.injected(FailOn::Update, key)?;
        self.inner
            .update(key, value, expected_revision, lease)
            .await
    }
}

/// Entry with a lease for lease-preservation checks.
pub fn leased(key: &str, value: &str, lease: i64) -> KeyValue {
    KeyValue::new(key, value).with_lease(lease)
}
