//! Migration runtime orchestration.
//!
//! The runtime drives one migration through its phases:
//! - Start order: source backend → destination backend → listing → copying
//! - Shutdown: signal the shared [`ShutdownContext`], then wait for every
//!   background task the backends spawned to acknowledge

use crate::backend::{self, Backend, BackendRole};
use crate::core::config::Config;
use crate::core::error::{BackendResult, MigrateError, MigrateResult};
use crate::migrate::{MigrationPhase, MigrationReport, Migrator, PhaseTracker};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A background task registered with the shutdown context.
struct BackgroundTask {
    name: String,
    handle: JoinHandle<BackendResult<()>>,
}

/// Cancellable execution context shared by both backends.
///
/// Backends spawn their background work through [`ShutdownContext::spawn`]
/// and watch a [`ShutdownSignal`] to know when to stop. Cloning is cheap;
/// every clone observes the same signal.
#[derive(Clone)]
pub struct ShutdownContext {
    /// Shutdown signal sender.
    shutdown_tx: Arc<watch::Sender<bool>>,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,

    /// Tasks awaiting acknowledgment on shutdown.
    tasks: Arc<Mutex<Vec<BackgroundTask>>>,
}

impl ShutdownContext {
    /// Create a new, uncancelled context.
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get a signal that resolves once shutdown is requested.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.shutdown_rx.clone(),
        }
    }

    /// Spawn a background task that must finish before shutdown completes.
    pub fn spawn<F>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = BackendResult<()>> + Send + 'static,
    {
        let name = name.into();
        tracing::debug!(task = %name, "background task started");
        let handle = tokio::spawn(task);
        self.tasks.lock().push(BackgroundTask { name, handle });
    }

    /// Number of tasks not yet collected by [`wait`](Self::wait).
    pub fn pending_tasks(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Request shutdown.
    pub fn cancel(&self) {
        tracing::debug!("shutdown requested");
        self.shutdown_tx.send_replace(true);
    }

    /// Check if shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Wait for every registered task to finish, bounded by `timeout`.
    ///
    /// Tasks that fail, panic, or outlive the timeout are reported together
    /// in a single [`MigrateError::Shutdown`].
    pub async fn wait(&self, timeout: Duration) -> MigrateResult<()> {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let deadline = tokio::time::Instant::now() + timeout;
        let mut failures = Vec::new();

        for task in tasks {
            let mut handle = task.handle;
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(()))) => {
                    tracing::debug!(task = %task.name, "background task stopped");
                }
                Ok(Ok(Err(e))) => {
                    tracing::warn!(task = %task.name, error = %e, "background task stopped with error");
                    failures.push(format!("{}: {}", task.name, e));
                }
                Ok(Err(e)) => {
                    tracing::warn!(task = %task.name, error = %e, "background task panicked");
                    failures.push(format!("{}: {}", task.name, e));
                }
                Err(_) => {
                    tracing::warn!(task = %task.name, "background task stop timed out");
                    handle.abort();
                    failures.push(format!("{}: timed out", task.name));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(MigrateError::Shutdown {
                message: failures.join("; "),
            })
        }
    }

    /// Request shutdown and wait for acknowledgment.
    pub async fn shutdown(&self, timeout: Duration) -> MigrateResult<()> {
        self.cancel();
        self.wait(timeout).await
    }
}

impl Default for ShutdownContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of the shutdown signal.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Check if shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested or the context is dropped.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Runtime for a single migration run.
pub struct Runtime {
    /// Configuration.
    config: Arc<Config>,

    /// Context shared by both backends.
    shutdown: ShutdownContext,

    /// Phase state machine.
    phases: PhaseTracker,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        Ok(Self {
            config: Arc::new(config),
            shutdown: ShutdownContext::new(),
            phases: PhaseTracker::new(),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the shared shutdown context.
    pub fn shutdown_context(&self) -> &ShutdownContext {
        &self.shutdown
    }

    /// Get the current phase.
    pub fn phase(&self) -> MigrationPhase {
        self.phases.current()
    }

    /// Get every phase entered so far.
    pub fn phase_history(&self) -> &[MigrationPhase] {
        self.phases.history()
    }

    /// Connect both configured backends and run the migration.
    ///
    /// An interrupt (Ctrl-C) stops the run and yields
    /// [`MigrateError::Cancelled`] once both backends have shut down.
    pub async fn run(&mut self) -> MigrateResult<MigrationReport> {
        self.run_until(interrupted()).await
    }

    /// Like [`run`](Self::run), but cancelled when `cancel` resolves.
    ///
    /// A `cancel` that is ready before the first connect still shuts down
    /// cleanly and yields [`MigrateError::Cancelled`].
    pub async fn run_until<F>(&mut self, cancel: F) -> MigrateResult<MigrationReport>
    where
        F: Future<Output = ()>,
    {
        self.phases.advance(MigrationPhase::ConnectingSource);
        let outcome = tokio::select! {
            biased;
            _ = cancel => {
                tracing::warn!("interrupt received, cancelling migration");
                Err(MigrateError::Cancelled)
            }
            result = self.connect_and_copy() => result,
        };
        self.finish(outcome).await
    }

    /// Run the migration against already-connected backends.
    pub async fn run_with(
        &mut self,
        source: Arc<dyn Backend>,
        destination: Arc<dyn Backend>,
    ) -> MigrateResult<MigrationReport> {
        self.phases.advance(MigrationPhase::ConnectingSource);
        self.phases.advance(MigrationPhase::ConnectingDestination);
        let outcome = self.copy(source, destination).await;
        self.finish(outcome).await
    }

    async fn connect_and_copy(&mut self) -> MigrateResult<MigrationReport> {
        tracing::info!("initializing source backend");
        let source = self.connect(BackendRole::Source).await?;

        self.phases.advance(MigrationPhase::ConnectingDestination);
        tracing::info!("initializing destination backend");
        let destination = self.connect(BackendRole::Destination).await?;

        tracing::info!("finished backend initialization");
        self.copy(source, destination).await
    }

    async fn connect(&self, role: BackendRole) -> MigrateResult<Arc<dyn Backend>> {
        let backend_config = self.config.backend_config(role);
        backend::connect(&backend_config, &self.shutdown)
            .await
            .map_err(|source| MigrateError::Connection {
                role,
                endpoint: backend_config.endpoint.clone(),
                source,
            })
    }

    async fn copy(
        &mut self,
        source: Arc<dyn Backend>,
        destination: Arc<dyn Backend>,
    ) -> MigrateResult<MigrationReport> {
        let migrator = Migrator::new(source, destination);

        self.phases.advance(MigrationPhase::Listing);
        let listing = migrator.list_source().await?;

        self.phases.advance(MigrationPhase::Copying);
        let mut report = MigrationReport::for_listing(&listing);
        migrator.copy_entries(&listing.kvs, &mut report).await?;
        Ok(report)
    }

    /// Shut both backends down and settle the final phase.
    async fn finish(
        &mut self,
        outcome: MigrateResult<MigrationReport>,
    ) -> MigrateResult<MigrationReport> {
        let timeout = self.config.runtime.shutdown_timeout();
        let before_copy = matches!(
            self.phases.current(),
            MigrationPhase::Idle
                | MigrationPhase::ConnectingSource
                | MigrationPhase::ConnectingDestination
                | MigrationPhase::Listing
        );

        // Failures before copying skip the shutdown phase but still release
        // whatever was opened.
        if let Err(ref e) = outcome {
            if before_copy && !e.is_cancelled() {
                if let Err(shutdown_err) = self.shutdown.shutdown(timeout).await {
                    tracing::warn!(error = %shutdown_err, "backend release failed after error");
                }
                self.phases.advance(MigrationPhase::Failed);
                return outcome;
            }
        }

        self.phases.advance(MigrationPhase::ShuttingDown);
        tracing::info!("shutting down");
        let shutdown = self.shutdown.shutdown(timeout).await;

        match (outcome, shutdown) {
            (Ok(report), Ok(())) => {
                self.phases.advance(MigrationPhase::Done);
                Ok(report)
            }
            (Err(MigrateError::Cancelled), Ok(())) => {
                self.phases.advance(MigrationPhase::Done);
                Err(MigrateError::Cancelled)
            }
            (Err(e), shutdown) => {
                if let Err(shutdown_err) = shutdown {
                    tracing::warn!(error = %shutdown_err, "shutdown failed after error");
                }
                self.phases.advance(MigrationPhase::Failed);
                Err(e)
            }
            (Ok(_), Err(e)) => {
                self.phases.advance(MigrationPhase::Failed);
                Err(e)
            }
        }
    }
}

/// Resolve on Ctrl-C. If the handler cannot be installed, never resolve.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for interrupt");
        std::future::pending::<()>().await;
    }
}
