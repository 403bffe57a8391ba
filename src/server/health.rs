//! Health check endpoint for liveness probes.
//!
//! Returns 200 OK while the relay is running and 503 once shutdown has
//! started, so a load balancer stops routing to a draining instance.

use axum::extract::State;
use axum::http::StatusCode;

use super::AppState;

/// Health check handler.
///
/// ```ignore
/// GET /health HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: text/plain
///
/// OK
/// ```
pub async fn health_handler<C>(State(app_state): State<AppState<C>>) -> (StatusCode, &'static str) {
    if app_state.context().is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "Shutting down")
    } else {
        (StatusCode::OK, "OK")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::DedupStore;
    use crate::relay::RelayContext;
    use crate::test_utils::MockConnector;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn health_tracks_shutdown_flag() {
        let dir = tempdir().unwrap();
        let ctx = Arc::new(RelayContext::new(
            DedupStore::open(dir.path().join("ids.json")),
            Vec::new(),
        ));
        let state = AppState::new(ctx.clone(), Arc::new(MockConnector::ready()), "@c.us");

        let (status, body) = health_handler(State(state.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");

        ctx.request_shutdown();
        let (status, _) = health_handler(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
