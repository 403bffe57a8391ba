//! Graceful shutdown and task supervision.
//!
//! The [`Supervisor`] owns the process's top-level error channel and the
//! join handles of the long-running tasks (the reconciliation loop and the
//! HTTP server). Whichever comes first, a termination signal, a fatal event,
//! or a task exiting on its own, it hands control to the
//! [`ShutdownCoordinator`] exactly once.
//!
//! # Shutdown Sequence
//!
//! Every step is best effort: failures are logged and the sequence moves on.
//!
//! 1. Set the shutdown flag. New sends, fetches, and HTTP work stop.
//! 2. Wait (bounded) for the server to drain and the loop to leave its tick.
//! 3. Release the connector.
//! 4. Back up the connector session directory, if configured.
//! 5. Persist the dedup store.
//! 6. Clear the liveness marker.
//!
//! The caller exits the process with [`ShutdownReport::exit_code`].

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::connector::Connector;
use crate::persistence::{backup_dir, clear_marker};
use crate::relay::RelayContext;

/// Why the process is shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A termination signal (`SIGINT`, `SIGTERM`).
    Signal(&'static str),

    /// An unrecoverable error, such as a connector that never came up.
    Fatal(String),

    /// A supervised task returned while the process was still running.
    TaskExited(&'static str),

    /// A supervised task panicked or was cancelled.
    TaskFailed(String),
}

impl ShutdownReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Signal(_) => 0,
            ShutdownReason::Fatal(_)
            | ShutdownReason::TaskExited(_)
            | ShutdownReason::TaskFailed(_) => 1,
        }
    }
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "received {}", name),
            ShutdownReason::Fatal(msg) => write!(f, "fatal error: {}", msg),
            ShutdownReason::TaskExited(name) => write!(f, "task {} exited unexpectedly", name),
            ShutdownReason::TaskFailed(msg) => write!(f, "task failed: {}", msg),
        }
    }
}

/// Paths and limits used by the shutdown sequence.
#[derive(Debug, Clone)]
pub struct ShutdownOptions {
    pub marker_path: PathBuf,
    pub session_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub drain_timeout: Duration,
}

/// What the shutdown sequence managed to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub reason: ShutdownReason,
    pub exit_code: i32,
    /// All supervised tasks finished within the drain timeout.
    pub drained: bool,
    pub connector_released: bool,
    /// Files copied to the backup directory, if a backup ran and succeeded.
    pub session_files_backed_up: Option<u64>,
    pub dedup_persisted: bool,
    pub marker_cleared: bool,
}

/// Runs the shutdown sequence at most once per process.
pub struct ShutdownCoordinator<C> {
    ctx: Arc<RelayContext>,
    connector: Arc<C>,
    options: ShutdownOptions,
    started: AtomicBool,
}

impl<C: Connector> ShutdownCoordinator<C> {
    pub fn new(ctx: Arc<RelayContext>, connector: Arc<C>, options: ShutdownOptions) -> Self {
        ShutdownCoordinator {
            ctx,
            connector,
            options,
            started: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> &Arc<RelayContext> {
        &self.ctx
    }

    /// Returns true once the sequence has started.
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Runs the shutdown sequence, draining `tasks`.
    ///
    /// Returns `None` if shutdown was already triggered; the second caller
    /// does nothing.
    #[instrument(skip_all, fields(reason = %reason))]
    pub async fn shutdown(
        &self,
        reason: ShutdownReason,
        tasks: &mut JoinSet<&'static str>,
    ) -> Option<ShutdownReport> {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("Shutdown already in progress, ignoring trigger");
            return None;
        }

        let exit_code = reason.exit_code();
        if exit_code == 0 {
            info!("Shutting down");
        } else {
            error!("Shutting down after failure");
        }

        self.ctx.request_shutdown();
        let drained = self.drain(tasks).await;
        let connector_released = self.release_connector().await;
        let session_files_backed_up = self.backup_session();
        let dedup_persisted = self.persist_dedup().await;
        let marker_cleared = self.clear_marker();

        info!(
            exit_code,
            drained,
            connector_released,
            dedup_persisted,
            marker_cleared,
            "Shutdown complete"
        );

        Some(ShutdownReport {
            reason,
            exit_code,
            drained,
            connector_released,
            session_files_backed_up,
            dedup_persisted,
            marker_cleared,
        })
    }

    async fn drain(&self, tasks: &mut JoinSet<&'static str>) -> bool {
        let wait_all = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(name) => debug!(task = name, "Task stopped"),
                    Err(e) if e.is_panic() => error!(error = %e, "Task panicked during shutdown"),
                    Err(e) => debug!(error = %e, "Task cancelled"),
                }
            }
        };

        let drained = tokio::time::timeout(self.options.drain_timeout, wait_all)
            .await
            .is_ok();
        if drained {
            return true;
        }

        warn!(
            timeout_secs = self.options.drain_timeout.as_secs(),
            remaining = tasks.len(),
            "Tasks did not drain in time, aborting them"
        );
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        false
    }

    async fn release_connector(&self) -> bool {
        match self.connector.release().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to release connector");
                false
            }
        }
    }

    fn backup_session(&self) -> Option<u64> {
        let (Some(source), Some(destination)) =
            (&self.options.session_dir, &self.options.backup_dir)
        else {
            return None;
        };

        match backup_dir(source, destination) {
            Ok(files) => {
                info!(files, destination = %destination.display(), "Backed up connector session");
                Some(files)
            }
            Err(e) => {
                warn!(source = %source.display(), error = %e, "Failed to back up connector session");
                None
            }
        }
    }

    async fn persist_dedup(&self) -> bool {
        match self.ctx.flush_dedup(true).await {
            Ok(count) => {
                debug!(count = count.unwrap_or_default(), "Persisted dedup store");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist dedup store");
                false
            }
        }
    }

    fn clear_marker(&self) -> bool {
        match clear_marker(&self.options.marker_path) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.options.marker_path.display(), error = %e, "Failed to clear liveness marker");
                false
            }
        }
    }
}

/// Events that request a shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Signal(&'static str),
    Fatal(String),
}

/// Watches the supervised tasks and the event channel, then shuts down.
pub struct Supervisor<C> {
    coordinator: ShutdownCoordinator<C>,
    sender: mpsc::Sender<SupervisorEvent>,
    events: mpsc::Receiver<SupervisorEvent>,
    tasks: JoinSet<&'static str>,
}

impl<C: Connector> Supervisor<C> {
    pub fn new(coordinator: ShutdownCoordinator<C>) -> Self {
        let (sender, events) = mpsc::channel(16);
        Supervisor {
            coordinator,
            sender,
            events,
            tasks: JoinSet::new(),
        }
    }

    /// A handle for reporting signals and fatal errors.
    pub fn sender(&self) -> mpsc::Sender<SupervisorEvent> {
        self.sender.clone()
    }

    /// Spawns a task whose exit (before shutdown) brings the process down.
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(async move {
            task.await;
            name
        });
    }

    /// Waits for the first shutdown trigger and runs the shutdown sequence.
    pub async fn run(mut self) -> ShutdownReport {
        let reason = tokio::select! {
            biased;
            Some(event) = self.events.recv() => match event {
                SupervisorEvent::Signal(name) => ShutdownReason::Signal(name),
                SupervisorEvent::Fatal(message) => ShutdownReason::Fatal(message),
            },
            Some(joined) = self.tasks.join_next() => match joined {
                Ok(name) => ShutdownReason::TaskExited(name),
                Err(e) => ShutdownReason::TaskFailed(e.to_string()),
            },
        };

        match self.coordinator.shutdown(reason.clone(), &mut self.tasks).await {
            Some(report) => report,
            None => ShutdownReport {
                exit_code: reason.exit_code(),
                reason,
                drained: false,
                connector_released: false,
                session_files_backed_up: None,
                dedup_persisted: false,
                marker_cleared: false,
            },
        }
    }
}
