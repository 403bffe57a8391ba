//! reqwest-backed client for the remote notification API.
//!
//! Two endpoints are used, both plain GETs with query parameters:
//!
//! - `<pending_url>?id_sekolah=<tenant>` returns `[{id, nohp, pesan}, ...]`
//! - `<update_url>?id=<id>&status=<terkirim|pending>&id_sekolah=<tenant>`
//!   acknowledges an attempt; its body is ignored
//!
//! Every request is bounded by the client-wide timeout.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::error::TransportError;
use super::{RemoteSource, StatusReporter};
use crate::types::{DeliveryStatus, MessageId, PendingMessage, PendingRecord, TenantId};

/// Query parameter naming the tenant on both endpoints.
const TENANT_PARAM: &str = "id_sekolah";

/// HTTP client for the pending and update endpoints.
#[derive(Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    pending_url: String,
    update_url: String,
}

impl RemoteClient {
    /// Creates a client whose requests time out after `timeout`.
    pub fn new(
        pending_url: impl Into<String>,
        update_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_http(http, pending_url, update_url))
    }

    /// Creates a client from a pre-configured reqwest client.
    pub fn with_http(
        http: reqwest::Client,
        pending_url: impl Into<String>,
        update_url: impl Into<String>,
    ) -> Self {
        RemoteClient {
            http,
            pending_url: pending_url.into(),
            update_url: update_url.into(),
        }
    }

    pub fn pending_url(&self) -> &str {
        &self.pending_url
    }

    pub fn update_url(&self) -> &str {
        &self.update_url
    }

    async fn get_pending(&self, tenant: &TenantId) -> Result<Vec<PendingMessage>, TransportError> {
        let response = self
            .http
            .get(&self.pending_url)
            .query(&[(TENANT_PARAM, tenant.as_str())])
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest("fetching pending messages", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::from_status(
                status.as_u16(),
                format!("pending endpoint rejected tenant {}", tenant),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest("reading pending messages", e))?;

        let values: Vec<serde_json::Value> = serde_json::from_slice(&bytes).map_err(|e| {
            TransportError::malformed(format!(
                "pending payload for tenant {} is not a message array: {}",
                tenant, e
            ))
        })?;

        // A bad record is dropped on its own; it must not hide the rest.
        let total = values.len();
        let messages: Vec<PendingMessage> = values
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value::<PendingRecord>(value) {
                Ok(record) => Some(record.into_message(tenant)),
                Err(e) => {
                    warn!(tenant = %tenant, index, error = %e, "Skipping malformed pending record");
                    None
                }
            })
            .collect();

        debug!(tenant = %tenant, count = messages.len(), total, "Fetched pending messages");
        Ok(messages)
    }

    async fn send_report(
        &self,
        tenant: &TenantId,
        id: &MessageId,
        status: DeliveryStatus,
    ) -> Result<(), TransportError> {
        let response = self
            .http
            .get(&self.update_url)
            .query(&[
                ("id", id.as_str()),
                ("status", status.as_str()),
                (TENANT_PARAM, tenant.as_str()),
            ])
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest("reporting delivery status", e))?;

        let code = response.status();
        if !code.is_success() {
            return Err(TransportError::from_status(
                code.as_u16(),
                format!("update endpoint rejected message {}", id),
            ));
        }

        trace!(tenant = %tenant, message_id = %id, status = %status, "Reported status");
        Ok(())
    }
}

impl RemoteSource for RemoteClient {
    fn fetch_pending(
        &self,
        tenant: &TenantId,
    ) -> impl Future<Output = Result<Vec<PendingMessage>, TransportError>> + Send {
        self.get_pending(tenant)
    }
}

impl StatusReporter for RemoteClient {
    fn report(
        &self,
        tenant: &TenantId,
        id: &MessageId,
        delivered: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.send_report(tenant, id, DeliveryStatus::from(delivered))
    }
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("pending_url", &self.pending_url)
            .field("update_url", &self.update_url)
            .finish_non_exhaustive()
    }
}
