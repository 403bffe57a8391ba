//! Direct send endpoint.
//!
//! Lets local callers push one message through the connector without going
//! through the remote queue. Sends made here never touch the dedup store.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::AppState;
use crate::connector::{Connector, ConnectorError, normalize_target};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub phone: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub status: bool,
    pub target: String,
}

#[derive(Debug, Serialize)]
struct FailureBody {
    status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Errors that can occur when handling a send request.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("relay is shutting down")]
    ShuttingDown,

    #[error("connector is not ready")]
    NotReady,

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("{0}")]
    Connector(#[from] ConnectorError),

    #[error("message to {0} was not delivered")]
    Undelivered(String),
}

impl IntoResponse for SendError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            SendError::ShuttingDown | SendError::NotReady => (StatusCode::SERVICE_UNAVAILABLE, None),
            SendError::InvalidBody(_) => (StatusCode::BAD_REQUEST, Some(self.to_string())),
            SendError::Connector(_) | SendError::Undelivered(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Some(self.to_string()))
            }
        };

        (
            status,
            Json(FailureBody {
                status: false,
                message,
            }),
        )
            .into_response()
    }
}

/// Send handler.
///
/// # Response
///
/// - 200 OK: `{"status": true, "target": "<normalized target>"}`
/// - 400 Bad Request: body is not `{phone, message}`
/// - 500 Internal Server Error: the connector failed or did not deliver
/// - 503 Service Unavailable: shutting down or no active session
///
/// # Example
///
/// ```ignore
/// POST /send-message HTTP/1.1
/// Content-Type: application/json
///
/// {"phone": "08123456789", "message": "Rapat wali murid besok pukul 09.00"}
///
/// HTTP/1.1 200 OK
///
/// {"status": true, "target": "08123456789@c.us"}
/// ```
pub async fn send_message_handler<C: Connector>(
    State(app_state): State<AppState<C>>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendMessageResponse>, SendError> {
    // Checked before the body so shutdown always wins.
    if app_state.context().is_shutting_down() {
        return Err(SendError::ShuttingDown);
    }

    let Json(request) = payload.map_err(|e| SendError::InvalidBody(e.body_text()))?;

    if !app_state.connector().is_ready().await {
        return Err(SendError::NotReady);
    }

    let target = normalize_target(&request.phone, app_state.contact_suffix());
    let delivered = app_state
        .connector()
        .send(&target, &request.message)
        .await
        .inspect_err(|e| warn!(chat_id = %target, error = %e, "Direct send failed"))?;

    if !delivered {
        warn!(chat_id = %target, "Direct send not delivered");
        return Err(SendError::Undelivered(target));
    }

    info!(chat_id = %target, "Direct send delivered");
    Ok(Json(SendMessageResponse {
        status: true,
        target,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(error: SendError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn unavailable_errors_omit_message() {
        let (status, body) = body_of(SendError::NotReady).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, serde_json::json!({"status": false}));
    }

    #[tokio::test]
    async fn mid_send_unavailable_is_a_server_error() {
        let err = SendError::from(ConnectorError::Unavailable("session dropped".into()));
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"].as_str().unwrap().contains("session dropped"));
    }
}
