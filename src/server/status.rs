//! Status endpoint: a point-in-time view of the relay.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AppState;
use crate::connector::Connector;
use crate::types::{LoopState, TenantId};

/// Body of `GET /status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: LoopState,
    pub client_ready: bool,
    /// Number of ids in the dedup store.
    pub pending_ids: usize,
    pub timestamp: DateTime<Utc>,
    pub sekolah: Vec<TenantId>,
}

/// Status handler.
///
/// ```ignore
/// GET /status HTTP/1.1
///
/// HTTP/1.1 200 OK
///
/// {
///   "status": "ready",
///   "clientReady": true,
///   "pendingIds": 412,
///   "timestamp": "2026-03-02T08:15:00Z",
///   "sekolah": ["7", "12"]
/// }
/// ```
pub async fn status_handler<C: Connector>(State(app_state): State<AppState<C>>) -> Response {
    let ctx = app_state.context();
    if ctx.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({"status": false})))
            .into_response();
    }

    let response = StatusResponse {
        status: ctx.loop_state(),
        client_ready: app_state.connector().is_ready().await,
        pending_ids: ctx.processed_count().await,
        timestamp: Utc::now(),
        sekolah: ctx.tenants().to_vec(),
    };

    Json(response).into_response()
}
