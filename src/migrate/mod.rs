//! Migration driver.
//!
//! Copies every entry of a source backend into a destination backend:
//! - [`Migrator`] - list-then-copy algorithm
//! - [`phase`] - Run phase state machine
//!
//! Entries are written one at a time in list order. A create that collides
//! with an existing key falls back to an unconditional update, so re-running
//! a migration converges on the same destination content. Any other failure
//! stops the copy immediately.

pub mod phase;

pub use phase::{MigrationPhase, PhaseTracker};

use crate::backend::{Backend, KeyValue, ListResult, MATCH_ALL};
use crate::core::error::{BackendError, BackendResult, MigrateError, MigrateResult};
use std::sync::Arc;

/// How a single entry reached the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Key was new to the destination.
    Created,
    /// Key existed and was overwritten.
    Overwritten,
}

/// Summary of a completed copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Source revision the listing was taken at. Informational only.
    pub snapshot_revision: i64,
    /// Entries returned by the source listing.
    pub listed: usize,
    /// Entries created in the destination.
    pub created: usize,
    /// Entries that already existed in the destination and were overwritten.
    pub overwritten: usize,
}

impl MigrationReport {
    /// Empty report for a source listing.
    pub fn for_listing(listing: &ListResult) -> Self {
        Self {
            snapshot_revision: listing.revision,
            listed: listing.kvs.len(),
            created: 0,
            overwritten: 0,
        }
    }

    /// Entries written so far.
    pub fn copied(&self) -> usize {
        self.created + self.overwritten
    }

    fn record(&mut self, outcome: CopyOutcome) {
        match outcome {
            CopyOutcome::Created => self.created += 1,
            CopyOutcome::Overwritten => self.overwritten += 1,
        }
    }
}

/// Copies a source backend into a destination backend.
pub struct Migrator {
    source: Arc<dyn Backend>,
    destination: Arc<dyn Backend>,
}

impl Migrator {
    /// Create a migrator for the given pair of backends.
    pub fn new(source: Arc<dyn Backend>, destination: Arc<dyn Backend>) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// List and copy everything.
    pub async fn migrate(&self) -> MigrateResult<MigrationReport> {
        let listing = self.list_source().await?;
        let mut report = MigrationReport::for_listing(&listing);
        self.copy_entries(&listing.kvs, &mut report).await?;
        Ok(report)
    }

    /// Read the whole source key space at its current revision.
    ///
    /// The full result is materialized in memory; there is no pagination.
    pub async fn list_source(&self) -> MigrateResult<ListResult> {
        let listing = self
            .source
            .list(MATCH_ALL, &[], 0, 0)
            .await
            .map_err(|source| MigrateError::List { source })?;

        tracing::info!(
            backend = self.source.name(),
            revision = listing.revision,
            "copying {} items",
            listing.kvs.len()
        );
        Ok(listing)
    }

    /// Copy `entries` in order, stopping at the first failure.
    ///
    /// `report` is updated as entries are written, so on error it still
    /// reflects the copied prefix.
    pub async fn copy_entries(
        &self,
        entries: &[KeyValue],
        report: &mut MigrationReport,
    ) -> MigrateResult<()> {
        for kv in entries {
            let outcome = self
                .copy_entry(kv)
                .await
                .map_err(|source| MigrateError::write(&kv.key, report.copied(), source))?;
            report.record(outcome);
        }

        tracing::info!(
            created = report.created,
            overwritten = report.overwritten,
            "done"
        );
        Ok(())
    }

    /// Write one entry: create, or overwrite if the key already exists.
    pub async fn copy_entry(&self, kv: &KeyValue) -> BackendResult<CopyOutcome> {
        tracing::debug!(key = %kv.key_str(), lease = kv.lease, "copying");

        match self.destination.create(&kv.key, &kv.value, kv.lease).await {
            Ok(_) => Ok(CopyOutcome::Created),
            Err(e) if e.is_already_exists() => {
                tracing::warn!(key = %kv.key_str(), "overwriting existing key");
                let result = self
                    .destination
                    .update(&kv.key, &kv.value, 0, kv.lease)
                    .await?;
                if !result.updated {
                    return Err(BackendError::unavailable(format!(
                        "unconditional update of {} was rejected",
                        kv.key_str()
                    )));
                }
                Ok(CopyOutcome::Overwritten)
            }
            Err(e) => Err(e),
        }
    }
}
