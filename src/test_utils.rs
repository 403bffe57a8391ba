//! Shared test doubles and arbitrary generators for property-based testing.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::connector::{Connector, ConnectorError};
use crate::remote::{RemoteSource, StatusReporter, TransportError};
use crate::types::{MessageId, PendingMessage, TenantId};

pub fn arb_message_id() -> impl Strategy<Value = MessageId> {
    prop_oneof![
        any::<u64>().prop_map(MessageId::from),
        "[a-zA-Z0-9_-]{1,24}".prop_map(MessageId::new),
    ]
}

pub fn arb_message_ids() -> impl Strategy<Value = HashSet<MessageId>> {
    prop::collection::hash_set(arb_message_id(), 0..64)
}

/// Builds a pending message.
pub fn message(tenant: &str, id: &str, phone: &str, body: &str) -> PendingMessage {
    PendingMessage {
        id: MessageId::new(id),
        tenant: TenantId::new(tenant),
        recipient: phone.to_string(),
        body: body.to_string(),
    }
}

// ─── Remote source ───

#[derive(Default)]
struct SourceInner {
    messages: Mutex<HashMap<TenantId, Vec<PendingMessage>>>,
    failing: Mutex<HashSet<TenantId>>,
    fetches: AtomicUsize,
}

/// In-memory pending-message source. Clones share state.
#[derive(Clone, Default)]
pub struct MockSource {
    inner: Arc<SourceInner>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_messages(&self, tenant: &str, messages: Vec<PendingMessage>) {
        self.inner
            .messages
            .lock()
            .unwrap()
            .insert(TenantId::new(tenant), messages);
    }

    /// Makes every fetch for `tenant` fail with a transient error.
    pub fn fail_tenant(&self, tenant: &str) {
        self.inner
            .failing
            .lock()
            .unwrap()
            .insert(TenantId::new(tenant));
    }

    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }
}

impl RemoteSource for MockSource {
    fn fetch_pending(
        &self,
        tenant: &TenantId,
    ) -> impl Future<Output = Result<Vec<PendingMessage>, TransportError>> + Send {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        let result = if self.inner.failing.lock().unwrap().contains(tenant) {
            Err(TransportError::from_status(503, "service unavailable"))
        } else {
            Ok(self
                .inner
                .messages
                .lock()
                .unwrap()
                .get(tenant)
                .cloned()
                .unwrap_or_default())
        };
        async move { result }
    }
}

// ─── Status reporter ───

#[derive(Default)]
struct ReporterInner {
    reports: Mutex<Vec<(TenantId, MessageId, bool)>>,
    fail: AtomicBool,
    hang: AtomicBool,
}

/// Records every status report. Clones share state.
#[derive(Clone, Default)]
pub struct MockReporter {
    inner: Arc<ReporterInner>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every report fail (attempts are still recorded).
    pub fn fail_all(&self) {
        self.inner.fail.store(true, Ordering::SeqCst);
    }

    /// Makes every report hang forever (attempts are still recorded).
    pub fn hang_all(&self) {
        self.inner.hang.store(true, Ordering::SeqCst);
    }

    pub fn reports(&self) -> Vec<(TenantId, MessageId, bool)> {
        self.inner.reports.lock().unwrap().clone()
    }
}

impl StatusReporter for MockReporter {
    fn report(
        &self,
        tenant: &TenantId,
        id: &MessageId,
        delivered: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.inner
            .reports
            .lock()
            .unwrap()
            .push((tenant.clone(), id.clone(), delivered));
        let hang = self.inner.hang.load(Ordering::SeqCst);
        let result = if self.inner.fail.load(Ordering::SeqCst) {
            Err(TransportError::from_status(500, "update failed"))
        } else {
            Ok(())
        };
        async move {
            if hang {
                std::future::pending::<()>().await;
            }
            result
        }
    }
}

// ─── Connector ───

/// Scriptable connector.
#[derive(Default)]
pub struct MockConnector {
    reachable: AtomicBool,
    ready: AtomicBool,
    released: AtomicBool,
    release_calls: AtomicUsize,
    sent: Mutex<Vec<(String, String)>>,
    failing_targets: Mutex<HashSet<String>>,
    undelivered_targets: Mutex<HashSet<String>>,
    cancel_after_send: Mutex<Option<CancellationToken>>,
}

impl MockConnector {
    /// A reachable connector with an active session.
    pub fn ready() -> Self {
        let connector = MockConnector::default();
        connector.reachable.store(true, Ordering::SeqCst);
        connector.ready.store(true, Ordering::SeqCst);
        connector
    }

    /// A connector whose probe fails with a transport error.
    pub fn unreachable() -> Self {
        MockConnector::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Sends to `target` fail with `Unavailable`.
    pub fn fail_sends_to(&self, target: &str) {
        self.failing_targets
            .lock()
            .unwrap()
            .insert(target.to_string());
    }

    /// Sends to `target` succeed without delivering.
    pub fn undeliver_to(&self, target: &str) {
        self.undelivered_targets
            .lock()
            .unwrap()
            .insert(target.to_string());
    }

    /// Cancels `token` as soon as the first send completes.
    pub fn cancel_after_first_send(&self, token: CancellationToken) {
        *self.cancel_after_send.lock().unwrap() = Some(token);
    }

    /// Successful and failed send attempts, in order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    fn do_send(&self, target: &str, body: &str) -> Result<bool, ConnectorError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(ConnectorError::Unavailable("released".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((target.to_string(), body.to_string()));
        if let Some(token) = self.cancel_after_send.lock().unwrap().take() {
            token.cancel();
        }
        if self.failing_targets.lock().unwrap().contains(target) {
            return Err(ConnectorError::Unavailable("send failed".to_string()));
        }
        Ok(!self.undelivered_targets.lock().unwrap().contains(target))
    }
}

impl Connector for MockConnector {
    fn probe(&self) -> impl Future<Output = Result<bool, ConnectorError>> + Send {
        let result = if !self.reachable.load(Ordering::SeqCst) {
            Err(ConnectorError::Transport("connection refused".to_string()))
        } else {
            Ok(self.ready.load(Ordering::SeqCst) && !self.released.load(Ordering::SeqCst))
        };
        async move { result }
    }

    fn send(
        &self,
        target: &str,
        body: &str,
    ) -> impl Future<Output = Result<bool, ConnectorError>> + Send {
        let result = self.do_send(target, body);
        async move { result }
    }

    fn release(&self) -> impl Future<Output = Result<(), ConnectorError>> + Send {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        self.released.store(true, Ordering::SeqCst);
        async { Ok(()) }
    }
}
