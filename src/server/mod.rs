//! Local HTTP surface of the relay.
//!
//! # Endpoints
//!
//! - `POST /send-message` - Sends one message through the connector immediately
//! - `GET /status` - Loop state, connector readiness, and dedup store size
//! - `GET /health` - Liveness probe
//!
//! Every route answers 503 once shutdown has started.

use std::sync::Arc;

use crate::connector::Connector;
use crate::relay::RelayContext;

pub mod health;
pub mod send;
pub mod status;

pub use health::health_handler;
pub use send::send_message_handler;
pub use status::status_handler;

/// Shared application state, passed to handlers via axum's `State` extractor.
pub struct AppState<C> {
    inner: Arc<AppStateInner<C>>,
}

struct AppStateInner<C> {
    ctx: Arc<RelayContext>,
    connector: Arc<C>,
    contact_suffix: String,
}

// Manual impl: `C` itself need not be `Clone`.
impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        AppState {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> AppState<C> {
    pub fn new(ctx: Arc<RelayContext>, connector: Arc<C>, contact_suffix: impl Into<String>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                ctx,
                connector,
                contact_suffix: contact_suffix.into(),
            }),
        }
    }

    pub fn context(&self) -> &RelayContext {
        &self.inner.ctx
    }

    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    pub fn contact_suffix(&self) -> &str {
        &self.inner.contact_suffix
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<C>(app_state: AppState<C>) -> axum::Router
where
    C: Connector + 'static,
{
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/send-message", post(send_message_handler::<C>))
        .route("/status", get(status_handler::<C>))
        .route("/health", get(health_handler::<C>))
        .with_state(app_state)
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    use crate::persistence::DedupStore;
    use crate::test_utils::MockConnector;
    use crate::types::{LoopState, MessageId, TenantId};

    fn test_app_state() -> (AppState<MockConnector>, Arc<MockConnector>, TempDir) {
        let dir = tempdir().unwrap();
        let store = DedupStore::open(dir.path().join("ids.json"));
        let ctx = Arc::new(RelayContext::new(
            store,
            vec![TenantId::new("7"), TenantId::new("12")],
        ));
        let connector = Arc::new(MockConnector::ready());
        (AppState::new(ctx, connector.clone(), "@c.us"), connector, dir)
    }

    fn send_request(body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/send-message")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    // ─── Send endpoint ───

    #[tokio::test]
    async fn send_normalizes_phone_and_returns_target() {
        let (state, connector, _dir) = test_app_state();
        let app = build_router(state);

        let response = app
            .oneshot(send_request(&serde_json::json!({"phone": "0811", "message": "hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body, serde_json::json!({"status": true, "target": "0811@c.us"}));
        assert_eq!(connector.sent(), vec![("0811@c.us".to_string(), "hi".to_string())]);
    }

    #[tokio::test]
    async fn send_keeps_existing_domain() {
        let (state, connector, _dir) = test_app_state();
        let app = build_router(state);

        let response = app
            .oneshot(send_request(
                &serde_json::json!({"phone": "123-456@g.us", "message": "group"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(connector.sent()[0].0, "123-456@g.us");
    }

    #[tokio::test]
    async fn send_during_shutdown_returns_503_without_sending() {
        let (state, connector, _dir) = test_app_state();
        state.context().request_shutdown();
        let app = build_router(state);

        let response = app
            .oneshot(send_request(&serde_json::json!({"phone": "0811", "message": "hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await, serde_json::json!({"status": false}));
        assert!(connector.sent().is_empty());
    }

    #[tokio::test]
    async fn send_with_unready_connector_returns_503() {
        let (state, connector, _dir) = test_app_state();
        connector.set_ready(false);
        let app = build_router(state);

        let response = app
            .oneshot(send_request(&serde_json::json!({"phone": "0811", "message": "hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(connector.sent().is_empty());
    }

    #[tokio::test]
    async fn send_failure_returns_500_with_message() {
        let (state, connector, _dir) = test_app_state();
        connector.fail_sends_to("0811@c.us");
        let app = build_router(state);

        let response = app
            .oneshot(send_request(&serde_json::json!({"phone": "0811", "message": "hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["status"], false);
        assert!(body["message"].as_str().unwrap().contains("send failed"));
    }

    #[tokio::test]
    async fn undelivered_send_returns_500() {
        let (state, connector, _dir) = test_app_state();
        connector.undeliver_to("0811@c.us");
        let app = build_router(state);

        let response = app
            .oneshot(send_request(&serde_json::json!({"phone": "0811", "message": "hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn send_with_missing_field_returns_400() {
        let (state, connector, _dir) = test_app_state();
        let app = build_router(state);

        let response = app
            .oneshot(send_request(&serde_json::json!({"phone": "0811"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["status"], false);
        assert!(connector.sent().is_empty());
    }

    // ─── Status endpoint ───

    #[tokio::test]
    async fn status_reports_snapshot() {
        let (state, _connector, _dir) = test_app_state();
        state
            .context()
            .dedup()
            .lock()
            .await
            .mark_processed(MessageId::new("1"));
        state.context().set_loop_state(LoopState::Ready);
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["clientReady"], true);
        assert_eq!(body["pendingIds"], 1);
        assert_eq!(body["sekolah"], serde_json::json!(["7", "12"]));
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn status_during_shutdown_returns_503() {
        let (state, _connector, _dir) = test_app_state();
        state.context().request_shutdown();
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    // ─── Health endpoint ───

    #[tokio::test]
    async fn health_returns_200_then_503() {
        let (state, _connector, _dir) = test_app_state();
        let app = build_router(state.clone());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");

        state.context().request_shutdown();
        let app = build_router(state);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
