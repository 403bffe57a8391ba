//! Remote notification API: pending-message source and status reporter.
//!
//! The reconciliation loop depends only on the two traits below; the
//! reqwest implementation lives in [`client`]. Neither side retries or
//! touches shared state; retry policy belongs to the caller.

use std::future::Future;

mod client;
mod error;

pub use client::RemoteClient;
pub use error::{TransportError, TransportErrorKind};

use crate::types::{MessageId, PendingMessage, TenantId};

/// Fetches messages waiting to be relayed for a tenant.
///
/// # Example (mock for testing)
///
/// ```ignore
/// struct FixedSource(Vec<PendingMessage>);
///
/// impl RemoteSource for FixedSource {
///     async fn fetch_pending(&self, _t: &TenantId) -> Result<Vec<PendingMessage>, TransportError> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
pub trait RemoteSource {
    /// Returns the tenant's pending messages in source order.
    ///
    /// Fails with `TransportError` on a non-success status or a payload
    /// that is not an array of messages.
    fn fetch_pending(
        &self,
        tenant: &TenantId,
    ) -> impl Future<Output = Result<Vec<PendingMessage>, TransportError>> + Send;
}

/// Reports the outcome of a dispatch attempt back to the remote API.
pub trait StatusReporter {
    /// Marks `id` as delivered (`terkirim`) or `pending`.
    fn report(
        &self,
        tenant: &TenantId,
        id: &MessageId,
        delivered: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
