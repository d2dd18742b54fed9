//! Concurrency limit for backend operations.
//!
//! In-process stores have no sockets to pool, so `pool.max_open` is
//! enforced as a bound on concurrently executing operations.

use crate::core::config::PoolConfig;
use crate::core::error::{BackendError, BackendResult};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Gate that every backend operation passes through.
#[derive(Debug, Clone, Default)]
pub struct PoolGate {
    max_open: usize,
    semaphore: Option<Arc<Semaphore>>,
}

impl PoolGate {
    /// A gate with no limit.
    pub fn unlimited() -> Self {
        Self {
            max_open: 0,
            semaphore: None,
        }
    }

    /// A gate allowing at most `max_open` concurrent operations (0 = unlimited).
    pub fn new(max_open: usize) -> Self {
        Self {
            max_open,
            semaphore: (max_open > 0).then(|| Arc::new(Semaphore::new(max_open))),
        }
    }

    /// Build a gate from pool configuration.
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.max_open)
    }

    /// Configured limit, if any.
    pub fn limit(&self) -> Option<usize> {
        (self.max_open > 0).then_some(self.max_open)
    }

    /// Operations that could start right now without waiting.
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Wait for a slot. Holding the returned permit keeps the slot occupied.
    pub async fn acquire(&self) -> BackendResult<Option<SemaphorePermit<'_>>> {
        match &self.semaphore {
            Some(semaphore) => semaphore
                .acquire()
                .await
                .map(Some)
                .map_err(|_| BackendError::Closed),
            None => Ok(None),
        }
    }
}
