//! Tests for the migration driver and runtime.

mod common;

use common::{
    contents, map, memory_backend_with, memory_config, populated_backend, FailOn, FlakyBackend,
};
use kvmigrate::backend::{Backend, MemoryBackend};
use kvmigrate::core::config::Config;
use kvmigrate::core::runtime::Runtime;
use kvmigrate::error::{BackendError, MigrateError};
use kvmigrate::migrate::{CopyOutcome, MigrationPhase, Migrator};
use std::sync::Arc;

// ============================================================================
// Copy Algorithm
// ============================================================================

#[tokio::test]
async fn copies_into_empty_destination() {
    let source = memory_backend_with(&[("a", "1"), ("b", "2")]).await;
    let destination = Arc::new(MemoryBackend::new());

    let report = Migrator::new(source, destination.clone())
        .migrate()
        .await
        .unwrap();

    assert_eq!(contents(&*destination).await, map(&[("a", "1"), ("b", "2")]));
    assert_eq!(report.listed, 2);
    assert_eq!(report.created, 2);
    assert_eq!(report.overwritten, 0);
    assert_eq!(report.snapshot_revision, 2);
}

#[tokio::test]
async fn overwrites_existing_destination_keys() {
    let source = memory_backend_with(&[("a", "1"), ("b", "2")]).await;
    let destination = memory_backend_with(&[("a", "0")]).await;

    let report = Migrator::new(source, destination.clone())
        .migrate()
        .await
        .unwrap();

    assert_eq!(contents(&*destination).await, map(&[("a", "1"), ("b", "2")]));
    assert_eq!(report.created, 1);
    assert_eq!(report.overwritten, 1);
}

#[tokio::test]
async fn destination_assigns_fresh_revisions() {
    let source = memory_backend_with(&[("x", "1"), ("y", "2"), ("z", "3")]).await;
    let destination = memory_backend_with(&[("unrelated", "v")]).await;

    Migrator::new(source.clone(), destination.clone())
        .migrate()
        .await
        .unwrap();

    let src = source.get(b"x").unwrap();
    let dst = destination.get(b"x").unwrap();
    assert_eq!(src.mod_revision, 1);
    assert_eq!(dst.mod_revision, 2);
}

#[tokio::test]
async fn identical_entries_are_still_rewritten() {
    let source = memory_backend_with(&[("a", "1")]).await;
    let destination = memory_backend_with(&[("a", "1")]).await;
    let before = destination.get(b"a").unwrap().mod_revision;

    let report = Migrator::new(source, destination.clone())
        .migrate()
        .await
        .unwrap();

    assert_eq!(report.overwritten, 1);
    assert!(destination.get(b"a").unwrap().mod_revision > before);
}

#[tokio::test]
async fn leases_are_preserved() {
    let source = Arc::new(MemoryBackend::new());
    source.create(b"leased", b"v", 7587).await.unwrap();
    source.create(b"plain", b"v", 0).await.unwrap();
    let destination = Arc::new(MemoryBackend::new());
    destination.create(b"leased", b"old", 0).await.unwrap();

    Migrator::new(source, destination.clone())
        .migrate()
        .await
        .unwrap();

    let leased = destination.get(b"leased").unwrap();
    assert_eq!(leased.lease, 7587);
    assert!(leased.has_lease());
    assert!(!destination.get(b"plain").unwrap().has_lease());
}

#[tokio::test]
async fn migration_is_idempotent() {
    let source = populated_backend(25).await;
    let destination = memory_backend_with(&[("key-00003", "stale")]).await;

    let migrator = Migrator::new(source, destination.clone());
    migrator.migrate().await.unwrap();
    let once = contents(&*destination).await;

    let second = migrator.migrate().await.unwrap();
    let twice = contents(&*destination).await;

    assert_eq!(once, twice);
    assert_eq!(second.created, 0);
    assert_eq!(second.overwritten, 25);
}

#[tokio::test]
async fn every_source_entry_reaches_destination() {
    let source = populated_backend(100).await;
    let destination = Arc::new(MemoryBackend::new());

    Migrator::new(source.clone(), destination.clone())
        .migrate()
        .await
        .unwrap();

    assert_eq!(
        contents(&*source).await,
        contents(&*destination).await
    );
}

#[tokio::test]
async fn empty_source_writes_nothing() {
    let source = Arc::new(MemoryBackend::new());
    let destination = Arc::new(FlakyBackend::new(memory_backend_with(&[("keep", "me")]).await));

    let report = Migrator::new(source, destination.clone())
        .migrate()
        .await
        .unwrap();

    assert_eq!(report.listed, 0);
    assert_eq!(report.copied(), 0);
    assert_eq!(destination.writes(), 0);
    assert_eq!(contents(&*destination).await, map(&[("keep", "me")]));
}

#[tokio::test]
async fn failed_update_stops_the_copy() {
    let source = memory_backend_with(&[("a", "1"), ("b", "2"), ("c", "3")]).await;
    let inner = memory_backend_with(&[("b", "0")]).await;
    let destination = Arc::new(FlakyBackend::failing(inner.clone(), FailOn::Update, "b"));

    let err = Migrator::new(source, destination.clone())
        .migrate()
        .await
        .unwrap_err();

    match &err {
        MigrateError::Write {
            key,
            copied,
            source,
        } => {
            assert_eq!(key, "b");
            assert_eq!(*copied, 1);
            assert!(matches!(source, BackendError::Unavailable { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.copied(), Some(1));
    // "c" comes after the failing key and must not be written
    assert_eq!(contents(&*inner).await, map(&[("a", "1"), ("b", "0")]));
    assert_eq!(destination.creates(), 2);
}

#[tokio::test]
async fn non_conflict_create_failure_is_fatal() {
    let source = memory_backend_with(&[("a", "1"), ("b", "2")]).await;
    let inner = Arc::new(MemoryBackend::new());
    let destination = Arc::new(FlakyBackend::failing(inner.clone(), FailOn::Create, "a"));

    let err = Migrator::new(source, destination.clone())
        .migrate()
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Write { copied: 0, .. }));
    assert_eq!(destination.updates(), 0);
    assert!(inner.is_empty());
}

#[tokio::test]
async fn list_failure_is_reported() {
    let source = Arc::new(FlakyBackend::failing(
        memory_backend_with(&[("a", "1")]).await,
        FailOn::List,
        "",
    ));
    let destination = Arc::new(MemoryBackend::new());

    let err = Migrator::new(source, destination.clone())
        .migrate()
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::List { .. }));
    assert!(destination.is_empty());
}

#[tokio::test]
async fn copy_entry_reports_outcome() {
    let source = Arc::new(MemoryBackend::new());
    let destination = memory_backend_with(&[("a", "0")]).await;
    let migrator = Migrator::new(source, destination.clone());

    let existing = kvmigrate::KeyValue::new("a", "1");
    let fresh = common::leased("b", "2", 42);

    assert_eq!(
        migrator.copy_entry(&existing).await.unwrap(),
        CopyOutcome::Overwritten
    );
    assert_eq!(
        migrator.copy_entry(&fresh).await.unwrap(),
        CopyOutcome::Created
    );
    assert_eq!(destination.get(b"b").unwrap().lease, 42);
}

// ============================================================================
// Runtime
// ============================================================================

#[tokio::test]
async fn runtime_rejects_missing_endpoints() {
    assert!(Runtime::new(Config::default()).is_err());
    assert!(Runtime::new(Config::for_endpoints("memory://", "")).is_err());
}

#[tokio::test]
async fn runtime_run_with_reaches_done() {
    let mut runtime = Runtime::new(memory_config()).unwrap();
    let source = memory_backend_with(&[("a", "1"), ("b", "2")]).await;
    let destination = Arc::new(MemoryBackend::new());

    let report = runtime
        .run_with(source, destination.clone())
        .await
        .unwrap();

    assert_eq!(report.copied(), 2);
    assert_eq!(runtime.phase(), MigrationPhase::Done);
    assert_eq!(
        runtime.phase_history(),
        &[
            MigrationPhase::Idle,
            MigrationPhase::ConnectingSource,
            MigrationPhase::ConnectingDestination,
            MigrationPhase::Listing,
            MigrationPhase::Copying,
            MigrationPhase::ShuttingDown,
            MigrationPhase::Done,
        ]
    );
    assert!(runtime.shutdown_context().is_cancelled());
}

#[tokio::test]
async fn runtime_copy_failure_shuts_down_then_fails() {
    let mut runtime = Runtime::new(memory_config()).unwrap();
    let source = memory_backend_with(&[("a", "1")]).await;
    let destination = Arc::new(FlakyBackend::failing(
        Arc::new(MemoryBackend::new()),
        FailOn::Create,
        "a",
    ));

    let err = runtime.run_with(source, destination).await.unwrap_err();

    assert!(matches!(err, MigrateError::Write { .. }));
    assert_eq!(runtime.phase(), MigrationPhase::Failed);
    assert!(runtime
        .phase_history()
        .contains(&MigrationPhase::ShuttingDown));
}

#[tokio::test]
async fn runtime_list_failure_skips_shutdown_phase() {
    let mut runtime = Runtime::new(memory_config()).unwrap();
    let source = Arc::new(FlakyBackend::failing(
        Arc::new(MemoryBackend::new()),
        FailOn::List,
        "",
    ));

    let err = runtime
        .run_with(source, Arc::new(MemoryBackend::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::List { .. }));
    assert_eq!(runtime.phase(), MigrationPhase::Failed);
    assert!(!runtime
        .phase_history()
        .contains(&MigrationPhase::ShuttingDown));
    // Resources are still released
    assert!(runtime.shutdown_context().is_cancelled());
}

#[tokio::test]
async fn runtime_run_between_file_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("source.db");
    let destination_path = dir.path().join("destination.db");

    {
        let ctx = kvmigrate::runtime::ShutdownContext::new();
        let config = kvmigrate::config::BackendConfig::new(format!(
            "file://{}",
            source_path.display()
        ));
        let backend = kvmigrate::backend::connect(&config, &ctx).await.unwrap();
        backend.create(b"/registry/a", b"1", 0).await.unwrap();
        backend.create(b"/registry/b", b"2", 99).await.unwrap();
        ctx.shutdown(std::time::Duration::from_secs(5)).await.unwrap();
    }

    let config = Config::for_endpoints(
        format!("file://{}", source_path.display()),
        format!("file://{}", destination_path.display()),
    );
    let mut runtime = Runtime::new(config).unwrap();
    let report = runtime.run().await.unwrap();

    assert_eq!(report.created, 2);
    assert_eq!(runtime.phase(), MigrationPhase::Done);
    assert!(destination_path.exists());

    // Reopen the destination and check what was persisted
    let ctx = kvmigrate::runtime::ShutdownContext::new();
    let config = kvmigrate::config::BackendConfig::new(format!(
        "file://{}",
        destination_path.display()
    ));
    let backend = kvmigrate::backend::connect(&config, &ctx).await.unwrap();
    let listing = backend.list("%", &[], 0, 0).await.unwrap();
    assert_eq!(listing.kvs.len(), 2);
    assert_eq!(listing.kvs[1].key, b"/registry/b");
    assert_eq!(listing.kvs[1].lease, 99);
    ctx.shutdown(std::time::Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn runtime_connection_failure_is_typed() {
    // Parent of the store path is a regular file, so the store cannot be read
    let file = tempfile::NamedTempFile::new().unwrap();
    let bad = format!("file://{}/store.db", file.path().display());
    let mut runtime = Runtime::new(Config::for_endpoints("memory://", bad.clone())).unwrap();

    let err = runtime.run().await.unwrap_err();

    match err {
        MigrateError::Connection { role, endpoint, .. } => {
            assert_eq!(role, kvmigrate::backend::BackendRole::Destination);
            assert_eq!(endpoint, bad);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(runtime.phase(), MigrationPhase::Failed);
    assert_eq!(runtime.shutdown_context().pending_tasks(), 0);
}

#[tokio::test]
async fn runtime_cancel_shuts_down_then_done() {
    let mut runtime = Runtime::new(memory_config()).unwrap();

    let err = runtime
        .run_until(std::future::ready(()))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(runtime.phase(), MigrationPhase::Done);
    assert_eq!(
        runtime.phase_history(),
        &[
            MigrationPhase::Idle,
            MigrationPhase::ConnectingSource,
            MigrationPhase::ShuttingDown,
            MigrationPhase::Done,
        ]
    );
    assert!(runtime.shutdown_context().is_cancelled());
}

#[tokio::test]
async fn runtime_persist_failure_fails_after_copy() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("source.db");
    let destination_path = dir.path().join("destination.db");

    {
        let ctx = kvmigrate::runtime::ShutdownContext::new();
        let config = kvmigrate::config::BackendConfig::new(format!(
            "file://{}",
            source_path.display()
        ));
        let backend = kvmigrate::backend::connect(&config, &ctx).await.unwrap();
        backend.create(b"/registry/a", b"1", 0).await.unwrap();
        ctx.shutdown(std::time::Duration::from_secs(5)).await.unwrap();
    }

    // The temp file slot is taken by a directory, so the final write fails
    std::fs::create_dir(dir.path().join("destination.db.tmp")).unwrap();

    let config = Config::for_endpoints(
        format!("file://{}", source_path.display()),
        format!("file://{}", destination_path.display()),
    );
    let mut runtime = Runtime::new(config).unwrap();
    let err = runtime
        .run_until(std::future::pending::<()>())
        .await
        .unwrap_err();

    match &err {
        MigrateError::Shutdown { message } => assert!(message.contains("file-persist")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        runtime.phase_history(),
        &[
            MigrationPhase::Idle,
            MigrationPhase::ConnectingSource,
            MigrationPhase::ConnectingDestination,
            MigrationPhase::Listing,
            MigrationPhase::Copying,
            MigrationPhase::ShuttingDown,
            MigrationPhase::Failed,
        ]
    );
    assert!(!destination_path.exists());
}
