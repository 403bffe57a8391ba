//! Per-tick message values and the loop state enum.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{MessageId, TenantId};

/// A notification waiting to be forwarded, as returned by the pending endpoint.
///
/// The wire format uses the remote API's field names (`nohp`, `pesan`); the
/// tenant is not part of the payload and is attached by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub id: MessageId,
    pub tenant: TenantId,
    pub recipient: String,
    pub body: String,
}

/// Wire representation of one entry of the pending endpoint's array.
#[derive(Debug, Clone, Deserialize)]
pub struct PendingRecord {
    pub id: MessageId,
    pub nohp: String,
    pub pesan: String,
}

impl PendingRecord {
    /// Attaches the tenant the record was fetched for.
    pub fn into_message(self, tenant: &TenantId) -> PendingMessage {
        PendingMessage {
            id: self.id,
            tenant: tenant.clone(),
            recipient: self.nohp,
            body: self.pesan,
        }
    }
}

/// Delivery status as understood by the update endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    #[serde(rename = "terkirim")]
    Delivered,
    #[serde(rename = "pending")]
    Pending,
}

impl DeliveryStatus {
    /// The query-string value expected by the update endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "terkirim",
            DeliveryStatus::Pending => "pending",
        }
    }
}

impl From<bool> for DeliveryStatus {
    fn from(delivered: bool) -> Self {
        if delivered {
            DeliveryStatus::Delivered
        } else {
            DeliveryStatus::Pending
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one dispatch attempt. Reported upstream, then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub message_id: MessageId,
    pub tenant: TenantId,
    pub delivered: bool,
}

impl DispatchOutcome {
    pub fn status(&self) -> DeliveryStatus {
        DeliveryStatus::from(self.delivered)
    }
}

/// Whether a reconciliation tick is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LoopState {
    Idle = 0,
    Processing = 1,
    Ready = 2,
}

impl LoopState {
    /// Decodes the value stored in an `AtomicU8`. Unknown values map to `Idle`.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LoopState::Processing,
            2 => LoopState::Ready,
            _ => LoopState::Idle,
        }
    }
}
