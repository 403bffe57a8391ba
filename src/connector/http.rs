//! Connector reached over HTTP on the local machine.
//!
//! The connector process exposes:
//!
//! - `GET  <base>/status` → `{"ready": bool}`
//! - `POST <base>/send` with `{"chatId", "message"}` → `{"delivered": bool}`;
//!   503 when no session is active
//! - `POST <base>/close` ends the session, keeping its files on disk

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Connector, ConnectorError};

#[derive(Debug, Deserialize)]
struct StatusBody {
    ready: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBody<'a> {
    chat_id: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendReply {
    delivered: bool,
}

/// A connector process reachable at `base_url`.
pub struct HttpConnector {
    http: reqwest::Client,
    base_url: String,
    released: AtomicBool,
}

impl HttpConnector {
    /// Creates a connector client whose requests time out after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpConnector {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            released: AtomicBool::new(false),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn ensure_active(&self) -> Result<(), ConnectorError> {
        if self.released.load(Ordering::Acquire) {
            return Err(ConnectorError::Unavailable("connector released".to_string()));
        }
        Ok(())
    }

    async fn get_status(&self) -> Result<bool, ConnectorError> {
        self.ensure_active()?;
        let response = self
            .http
            .get(self.url("status"))
            .send()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ConnectorError::Transport(format!(
                "status endpoint returned {}",
                response.status()
            )));
        }

        let body: StatusBody = response
            .json()
            .await
            .map_err(|e| ConnectorError::Transport(format!("invalid status body: {}", e)))?;
        Ok(body.ready)
    }

    async fn post_send(&self, target: &str, message: &str) -> Result<bool, ConnectorError> {
        self.ensure_active()?;
        let response = self
            .http
            .post(self.url("send"))
            .json(&SendBody {
                chat_id: target,
                message,
            })
            .send()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(ConnectorError::Unavailable("no active session".to_string()));
        }
        if status.is_client_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ConnectorError::Rejected(format!("{}: {}", status, detail)));
        }
        if !status.is_success() {
            return Err(ConnectorError::Transport(format!(
                "send endpoint returned {}",
                status
            )));
        }

        let reply: SendReply = response
            .json()
            .await
            .map_err(|e| ConnectorError::Transport(format!("invalid send reply: {}", e)))?;
        debug!(chat_id = %target, delivered = reply.delivered, "Connector send finished");
        Ok(reply.delivered)
    }

    async fn post_close(&self) -> Result<(), ConnectorError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let response = self
            .http
            .post(self.url("close"))
            .send()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ConnectorError::Transport(format!(
                "close endpoint returned {}",
                response.status()
            )));
        }
        info!("Connector session closed");
        Ok(())
    }
}

impl Connector for HttpConnector {
    fn probe(&self) -> impl Future<Output = Result<bool, ConnectorError>> + Send {
        self.get_status()
    }

    fn send(
        &self,
        target: &str,
        body: &str,
    ) -> impl Future<Output = Result<bool, ConnectorError>> + Send {
        self.post_send(target, body)
    }

    fn release(&self) -> impl Future<Output = Result<(), ConnectorError>> + Send {
        self.post_close()
    }
}

impl std::fmt::Debug for HttpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnector")
            .field("base_url", &self.base_url)
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector_for(server: &MockServer) -> HttpConnector {
        HttpConnector::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn probe_reads_ready_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ready": true})))
            .mount(&server)
            .await;

        let connector = connector_for(&server);
        assert!(connector.probe().await.unwrap());
        assert!(connector.is_ready().await);
    }

    #[tokio::test]
    async fn send_posts_target_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_json(serde_json::json!({"chatId": "0811@c.us", "message": "hi"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"delivered": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let connector = connector_for(&server);
        assert!(connector.send("0811@c.us", "hi").await.unwrap());
        server.verify().await;
    }

    #[tokio::test]
    async fn send_503_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let connector = connector_for(&server);
        let err = connector.send("0811@c.us", "hi").await.unwrap_err();
        assert!(matches!(err, ConnectorError::Unavailable(_)));
    }

    #[tokio::test]
    async fn send_400_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad number"))
            .mount(&server)
            .await;

        let connector = connector_for(&server);
        let err = connector.send("x@c.us", "hi").await.unwrap_err();
        assert!(matches!(err, ConnectorError::Rejected(ref m) if m.contains("bad number")));
    }

    #[tokio::test]
    async fn release_closes_once_and_blocks_sends() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/close"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let connector = connector_for(&server);
        connector.release().await.unwrap();
        connector.release().await.unwrap();

        let err = connector.send("0811@c.us", "hi").await.unwrap_err();
        assert!(matches!(err, ConnectorError::Unavailable(_)));
        assert!(!connector.is_ready().await);
        server.verify().await;
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let connector = HttpConnector::new("http://127.0.0.1:3001/", Duration::from_secs(1)).unwrap();
        assert_eq!(connector.base_url(), "http://127.0.0.1:3001");
        assert_eq!(connector.url("send"), "http://127.0.0.1:3001/send");
    }
}
