//! The messaging-client connector.
//!
//! The connector owns the actual messaging session (pairing, transport,
//! session files). The relay treats it as a capability: probe it, send a
//! body to a target, and release it at shutdown. [`HttpConnector`] talks to
//! a connector process running on the local machine.

use std::future::Future;

use thiserror::Error;

mod http;

pub use http::HttpConnector;

use crate::retry::{RetryConfig, Retriable, retry_with_backoff};
use tokio_util::sync::CancellationToken;

/// Default suffix the messaging network appends to personal contact ids.
pub const DEFAULT_CONTACT_SUFFIX: &str = "@c.us";

/// Errors raised by a connector.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// No active session (not paired yet, or already released).
    #[error("connector unavailable: {0}")]
    Unavailable(String),

    /// The connector could not be reached or answered with garbage.
    #[error("connector transport error: {0}")]
    Transport(String),

    /// The connector refused the request.
    #[error("connector rejected request: {0}")]
    Rejected(String),
}

impl Retriable for ConnectorError {
    fn is_retriable(&self) -> bool {
        !matches!(self, ConnectorError::Rejected(_))
    }
}

/// A messaging client able to deliver a text body to a target.
pub trait Connector: Send + Sync {
    /// Checks that the connector is reachable. `Ok(true)` means a session is
    /// active and sends can be attempted.
    fn probe(&self) -> impl Future<Output = Result<bool, ConnectorError>> + Send;

    /// Returns true if a session is active.
    fn is_ready(&self) -> impl Future<Output = bool> + Send {
        async move { matches!(self.probe().await, Ok(true)) }
    }

    /// Sends `body` to `target`. `Ok(false)` means the connector accepted the
    /// request but did not deliver the message.
    fn send(
        &self,
        target: &str,
        body: &str,
    ) -> impl Future<Output = Result<bool, ConnectorError>> + Send;

    /// Ends the session cleanly. Later sends fail with `Unavailable`.
    fn release(&self) -> impl Future<Output = Result<(), ConnectorError>> + Send;
}

/// Turns a phone number into a connector target.
///
/// Targets that already carry a domain (`...@c.us`, `...@g.us`) are kept as
/// is; bare numbers get `suffix` appended.
pub fn normalize_target(phone: &str, suffix: &str) -> String {
    let phone = phone.trim();
    if phone.contains('@') {
        phone.to_string()
    } else {
        format!("{}{}", phone, suffix)
    }
}

/// Waits until the connector answers its probe, retrying with backoff.
///
/// A connector that is reachable but not yet paired counts as initialized;
/// readiness is checked again before every tick.
pub async fn wait_until_reachable<C: Connector>(
    connector: &C,
    config: RetryConfig,
    cancel: &CancellationToken,
) -> Result<bool, ConnectorError> {
    retry_with_backoff(config, cancel, || connector.probe())
        .await
        .into_result()
}
