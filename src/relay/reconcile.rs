//! The pending-message reconciliation loop.
//!
//! One long-lived task runs ticks back to back, sleeping `poll_interval`
//! between them. A tick walks every tenant in configured order:
//!
//! 1. Checkpoint A: stop the tick if shutdown was requested
//! 2. Fetch the tenant's pending messages (transient failures retried with
//!    backoff); a failure skips only this tenant
//! 3. For each message, in source order:
//!    - Checkpoint B: stop this tenant if shutdown was requested
//!    - Skip it if its id is already in the dedup store
//!    - Wait a random pacing delay, unless this is the tick's first send
//!    - Send it through the connector; any error counts as `pending`
//!    - Report the outcome upstream (best effort)
//!    - Mark the id processed, whatever the outcome
//! 4. Flush the dedup store if it changed
//!
//! Once a send has happened its id is always marked. If shutdown arrives
//! while the report is in flight, the report gets `report_grace` to finish
//! and is then abandoned, so the shutdown drain never has to abort a tick
//! between send and mark.
//!
//! # Delivery Bookkeeping
//!
//! The dedup store records "attempted once", not "delivered". The remote
//! status field carries delivery truth. A message reported `pending` is
//! therefore never retried by this process; the relay prefers a missed
//! message over a duplicate one.
//!
//! # Failure Isolation
//!
//! Nothing inside a tick returns an error. Transport, connector, and
//! persistence failures are logged where they happen and the tick moves on.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::pacing::PacingConfig;
use super::state::RelayContext;
use crate::connector::{Connector, normalize_target};
use crate::remote::{RemoteSource, StatusReporter, TransportError};
use crate::retry::{RetryConfig, retry_with_backoff};
use crate::types::{DispatchOutcome, LoopState, PendingMessage, TenantId};

/// Loop timing and dispatch settings.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Sleep between the end of one tick and the start of the next.
    pub poll_interval: Duration,
    pub pacing: PacingConfig,
    /// Retry policy for pending-message fetches.
    pub fetch_retry: RetryConfig,
    /// Suffix appended to bare phone numbers.
    pub contact_suffix: String,
    /// How long an in-flight status report may run after shutdown starts.
    pub report_grace: Duration,
}

/// Default for [`LoopConfig::report_grace`].
pub const DEFAULT_REPORT_GRACE: Duration = Duration::from_secs(2);

impl LoopConfig {
    pub fn new(poll_interval: Duration, pacing: PacingConfig, contact_suffix: impl Into<String>) -> Self {
        LoopConfig {
            poll_interval,
            pacing,
            fetch_retry: RetryConfig::FETCH,
            contact_suffix: contact_suffix.into(),
            report_grace: DEFAULT_REPORT_GRACE,
        }
    }

    pub fn with_fetch_retry(mut self, fetch_retry: RetryConfig) -> Self {
        self.fetch_retry = fetch_retry;
        self
    }

    pub fn with_report_grace(mut self, report_grace: Duration) -> Self {
        self.report_grace = report_grace;
        self
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Messages the connector reported as delivered.
    pub delivered: usize,
    /// Messages attempted but not delivered (including connector errors).
    pub pending: usize,
    /// Messages skipped because their id was already processed.
    pub skipped_duplicates: usize,
    /// Tenants whose fetch failed this tick.
    pub failed_tenants: Vec<TenantId>,
    /// Status reports that could not be delivered upstream.
    pub report_failures: usize,
    /// The tick stopped early because shutdown was requested.
    pub aborted: bool,
    /// The connector had no active session, so nothing was fetched or sent.
    pub connector_unavailable: bool,
    /// Another tick was still running, so this one did nothing.
    pub overlapped: bool,
}

impl TickReport {
    /// Number of connector send attempts.
    pub fn attempted(&self) -> usize {
        self.delivered + self.pending
    }
}

/// Drives fetch, dedup, send, and acknowledge for every tenant.
pub struct ReconciliationLoop<S, R, C> {
    ctx: Arc<RelayContext>,
    source: S,
    reporter: R,
    connector: Arc<C>,
    config: LoopConfig,
}

impl<S, R, C> ReconciliationLoop<S, R, C>
where
    S: RemoteSource + Send + Sync,
    R: StatusReporter + Send + Sync,
    C: Connector,
{
    pub fn new(
        ctx: Arc<RelayContext>,
        source: S,
        reporter: R,
        connector: Arc<C>,
        config: LoopConfig,
    ) -> Self {
        ReconciliationLoop {
            ctx,
            source,
            reporter,
            connector,
            config,
        }
    }

    /// Runs ticks until shutdown is requested, then marks the loop `Idle`.
    pub async fn run(self) {
        info!(
            tenants = self.ctx.tenants().len(),
            interval_secs = self.config.poll_interval.as_secs(),
            "Reconciliation loop started"
        );
        let shutdown = self.ctx.shutdown().clone();

        while !shutdown.is_cancelled() {
            let report = self.tick().await;
            if report.attempted() > 0 || !report.failed_tenants.is_empty() {
                info!(
                    delivered = report.delivered,
                    pending = report.pending,
                    skipped = report.skipped_duplicates,
                    failed_tenants = report.failed_tenants.len(),
                    aborted = report.aborted,
                    "Tick finished"
                );
            } else {
                debug!(skipped = report.skipped_duplicates, "Tick finished, nothing to send");
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        self.ctx.set_loop_state(LoopState::Idle);
        info!("Reconciliation loop stopped");
    }

    /// Performs one full pass over all tenants.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let Some(_guard) = self.ctx.begin_tick() else {
            warn!("Previous tick still running, skipping");
            report.overlapped = true;
            return report;
        };

        if self.ctx.is_shutting_down() {
            report.aborted = true;
            return report;
        }

        if !self.connector.is_ready().await {
            warn!("Connector has no active session, skipping sends this tick");
            report.connector_unavailable = true;
            return report;
        }

        for tenant in self.ctx.tenants() {
            // Checkpoint A
            if self.ctx.is_shutting_down() {
                info!(tenant = %tenant, "Shutdown requested, aborting tick");
                report.aborted = true;
                break;
            }

            let messages = match self.fetch(tenant).await {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(tenant = %tenant, error = %e, "Failed to fetch pending messages");
                    report.failed_tenants.push(tenant.clone());
                    continue;
                }
            };

            self.process_tenant(tenant, messages, &mut report).await;
        }

        self.flush_dedup().await;
        report
    }

    async fn fetch(&self, tenant: &TenantId) -> Result<Vec<PendingMessage>, TransportError> {
        retry_with_backoff(self.config.fetch_retry, self.ctx.shutdown(), || {
            self.source.fetch_pending(tenant)
        })
        .await
        .into_result()
    }

    async fn process_tenant(
        &self,
        tenant: &TenantId,
        messages: Vec<PendingMessage>,
        report: &mut TickReport,
    ) {
        for message in messages {
            // Checkpoint B
            if self.ctx.is_shutting_down() {
                info!(tenant = %tenant, "Shutdown requested, leaving remaining messages");
                report.aborted = true;
                return;
            }

            if self.ctx.dedup().lock().await.contains(&message.id) {
                debug!(tenant = %tenant, message_id = %message.id, "Already processed, skipping");
                report.skipped_duplicates += 1;
                continue;
            }

            if report.attempted() > 0 {
                self.pace().await;
                if self.ctx.is_shutting_down() {
                    info!(tenant = %tenant, "Shutdown requested during pacing");
                    report.aborted = true;
                    return;
                }
            }

            let outcome = self.dispatch(&message).await;
            if outcome.delivered {
                report.delivered += 1;
            } else {
                report.pending += 1;
            }

            if let Err(e) = self.report_outcome(&outcome).await {
                warn!(
                    tenant = %tenant,
                    message_id = %outcome.message_id,
                    error = %e,
                    "Failed to report delivery status"
                );
                report.report_failures += 1;
            }

            self.ctx
                .dedup()
                .lock()
                .await
                .mark_processed(outcome.message_id);
        }
    }

    /// Reports one outcome upstream.
    ///
    /// Runs unbounded (apart from the HTTP timeout) until shutdown starts;
    /// from then on it has `report_grace` left.
    async fn report_outcome(&self, outcome: &DispatchOutcome) -> Result<(), TransportError> {
        let report = self
            .reporter
            .report(&outcome.tenant, &outcome.message_id, outcome.delivered);
        tokio::pin!(report);

        tokio::select! {
            biased;
            result = &mut report => result,
            _ = self.ctx.shutdown().cancelled() => {
                tokio::time::timeout(self.config.report_grace, &mut report)
                    .await
                    .unwrap_or_else(|_| Err(TransportError::transient("report abandoned at shutdown")))
            }
        }
    }

    /// Sends one message. Never fails: errors become a `pending` outcome.
    async fn dispatch(&self, message: &PendingMessage) -> DispatchOutcome {
        let target = normalize_target(&message.recipient, &self.config.contact_suffix);
        let delivered = match self.connector.send(&target, &message.body).await {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!(
                    tenant = %message.tenant,
                    message_id = %message.id,
                    error = %e,
                    "Send failed, reporting as pending"
                );
                false
            }
        };

        debug!(
            tenant = %message.tenant,
            message_id = %message.id,
            delivered,
            "Dispatched message"
        );
        DispatchOutcome {
            message_id: message.id.clone(),
            tenant: message.tenant.clone(),
            delivered,
        }
    }

    /// Waits a random pacing delay, ending early on shutdown.
    async fn pace(&self) {
        if self.config.pacing.is_disabled() {
            return;
        }
        let delay = self.config.pacing.next_delay();
        tokio::select! {
            biased;
            _ = self.ctx.shutdown().cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    async fn flush_dedup(&self) {
        match self.ctx.flush_dedup(false).await {
            Ok(Some(count)) => debug!(count, "Flushed dedup store"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to flush dedup store"),
        }
    }
}
