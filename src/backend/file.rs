//! Snapshot-file store.
//!
//! The file holds a bincode [`StoreSnapshot`]. It is loaded once when the
//! backend opens (a missing file is an empty store) and written back when
//! shutdown is signalled, but only if the store changed in between. Writes
//! go to a sibling temp file that is then renamed over the existing one.

use crate::backend::{
    Backend, ListResult, MemoryBackend, MemoryStore, PoolGate, StoreSnapshot, UpdateResult,
};
use crate::core::config::CompactionConfig;
use crate::core::error::{BackendError, BackendResult};
use crate::core::runtime::ShutdownContext;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// [`Backend`] persisted to a single snapshot file.
pub struct FileBackend {
    path: PathBuf,
    inner: MemoryBackend,
}

impl FileBackend {
    /// Load the store at `path` and register its persist-on-shutdown task.
    pub async fn open(
        path: impl Into<PathBuf>,
        ctx: &ShutdownContext,
        compaction: &CompactionConfig,
        gate: PoolGate,
    ) -> BackendResult<Self> {
        let path = path.into();
        let store = load(&path).await?;
        let loaded_revision = store.current_revision();

        tracing::debug!(
            path = %path.display(),
            keys = store.len(),
            revision = loaded_revision,
            "loaded snapshot file"
        );

        let mut inner = MemoryBackend::from_store(store).with_gate(gate);
        inner.start(ctx, compaction);

        let store = inner.store();
        let persist_path = path.clone();
        let mut signal = ctx.signal();
        ctx.spawn("file-persist", async move {
            signal.cancelled().await;
            let snapshot = store.read().snapshot();
            if snapshot.revision == loaded_revision {
                tracing::debug!(path = %persist_path.display(), "store unchanged, skipping persist");
                return Ok(());
            }
            persist(&persist_path, &snapshot).await?;
            tracing::info!(
                path = %persist_path.display(),
                keys = snapshot.records.len(),
                revision = snapshot.revision,
                "persisted snapshot file"
            );
            Ok(())
        });

        Ok(Self { path, inner })
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current state to disk now.
    pub async fn flush(&self) -> BackendResult<()> {
        persist(&self.path, &self.inner.snapshot()).await
    }

    /// The in-process store behind this file.
    pub fn memory(&self) -> &MemoryBackend {
        &self.inner
    }
}

async fn load(path: &Path) -> BackendResult<MemoryStore> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(MemoryStore::from_snapshot(StoreSnapshot::from_bytes(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MemoryStore::new()),
        Err(e) => Err(BackendError::io(
            &format!("failed to read {}", path.display()),
            e,
        )),
    }
}

async fn persist(path: &Path, snapshot: &StoreSnapshot) -> BackendResult<()> {
    let bytes = snapshot.to_bytes()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BackendError::io(&format!("failed to create {}", parent.display()), e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| BackendError::io(&format!("failed to write {}", tmp.display()), e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| BackendError::io(&format!("failed to replace {}", path.display()), e))?;
    Ok(())
}

#[async_trait]
impl Backend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn list(
        &self,
        pattern: &str,
        start_key: &[u8],
        limit: usize,
        revision: i64,
    ) -> BackendResult<ListResult> {
        self.inner.list(pattern, start_key, limit, revision).await
    }

    async fn create(&self, key: &[u8], value: &[u8], lease: i64) -> BackendResult<i64> {
        self.inner.create(key, value, lease).await
    }

    async fn update(
        &self,
        key: &[u8],
        value: &[u8],
        expected_revision: i64,
        lease: i64,
    ) -> BackendResult<UpdateResult> {
        self.inner
            .update(key, value, expected_revision, lease)
            .await
    }
}
