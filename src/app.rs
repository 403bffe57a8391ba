//! Process wiring: builds every component from a [`RelayConfig`], starts the
//! loop and the HTTP server, and hands control to the supervisor.

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::RelayConfig;
use crate::connector::{ConnectorError, HttpConnector, wait_until_reachable};
use crate::persistence::{DedupStore, is_marked_running, write_marker};
use crate::relay::{LoopConfig, ReconciliationLoop, RelayContext};
use crate::remote::RemoteClient;
use crate::retry::RetryConfig;
use crate::server::{AppState, build_router};
use crate::shutdown::{ShutdownCoordinator, ShutdownOptions, Supervisor, SupervisorEvent};

/// Errors that prevent the relay from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("connector did not come up: {0}")]
    Connector(#[from] ConnectorError),
}

/// Runs the relay until shutdown and returns the process exit code.
pub async fn run(config: RelayConfig) -> i32 {
    let connector = match HttpConnector::new(&config.connector_url, config.http_timeout) {
        Ok(connector) => Arc::new(connector),
        Err(e) => {
            error!(error = %StartupError::from(e), "Startup failed");
            return 1;
        }
    };
    let remote = match RemoteClient::new(&config.pending_url, &config.update_url, config.http_timeout)
    {
        Ok(remote) => remote,
        Err(e) => {
            error!(error = %StartupError::from(e), "Startup failed");
            return 1;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        warn!(path = %config.data_dir.display(), error = %e, "Failed to create data directory");
    }

    let marker_path = config.marker_path();
    if is_marked_running(&marker_path) {
        warn!("Liveness marker already present, previous run did not shut down cleanly");
    }
    if let Err(e) = write_marker(&marker_path) {
        warn!(path = %marker_path.display(), error = %e, "Failed to write liveness marker");
    }

    let store = DedupStore::open(config.dedup_path());
    info!(processed = store.len(), tenants = config.tenants.len(), "Relay starting");
    let ctx = Arc::new(RelayContext::new(store, config.tenants.clone()));

    let coordinator = ShutdownCoordinator::new(
        ctx.clone(),
        connector.clone(),
        ShutdownOptions {
            marker_path,
            session_dir: config.session_dir.clone(),
            backup_dir: config.backup_dir.clone(),
            drain_timeout: config.drain_timeout,
        },
    );
    let mut supervisor = Supervisor::new(coordinator);
    let events = supervisor.sender();

    match TcpListener::bind(config.bind).await {
        Ok(listener) => {
            info!(addr = %config.bind, "Listening");
            let router = build_router(AppState::new(
                ctx.clone(),
                connector.clone(),
                config.contact_suffix.clone(),
            ));
            let shutdown = ctx.shutdown().clone();
            supervisor.spawn("server", async move {
                if let Err(e) = axum::serve(listener, router)
                    .with_graceful_shutdown(shutdown.cancelled_owned())
                    .await
                {
                    error!(error = %e, "HTTP server failed");
                }
            });
        }
        Err(source) => {
            let e = StartupError::Bind {
                addr: config.bind,
                source,
            };
            let _ = events.send(SupervisorEvent::Fatal(e.to_string())).await;
        }
    }

    let relay = ReconciliationLoop::new(
        ctx.clone(),
        remote.clone(),
        remote,
        connector.clone(),
        LoopConfig::new(config.poll_interval, config.pacing, config.contact_suffix.clone()),
    );
    let startup_events = events.clone();
    let shutdown = ctx.shutdown().clone();
    supervisor.spawn("relay", async move {
        match wait_until_reachable(&*connector, RetryConfig::STARTUP, &shutdown).await {
            Ok(ready) => {
                info!(ready, "Connector reachable");
                relay.run().await;
            }
            Err(e) => {
                if !shutdown.is_cancelled() {
                    let e = StartupError::from(e);
                    let _ = startup_events.send(SupervisorEvent::Fatal(e.to_string())).await;
                }
                // Stay alive until the coordinator drains us.
                shutdown.cancelled().await;
            }
        }
    });

    let signal_task = tokio::spawn(forward_signals(events));
    let report = supervisor.run().await;
    signal_task.abort();
    report.exit_code
}

/// Forwards SIGINT and SIGTERM to the supervisor.
async fn forward_signals(events: mpsc::Sender<SupervisorEvent>) {
    let name = wait_for_signal().await;
    let _ = events.send(SupervisorEvent::Signal(name)).await;
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            return match tokio::signal::ctrl_c().await {
                Ok(()) => "SIGINT",
                Err(_) => std::future::pending().await,
            };
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => "SIGINT",
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGINT");
                sigterm.recv().await;
                "SIGTERM"
            }
        },
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "SIGINT",
        Err(_) => std::future::pending().await,
    }
}
