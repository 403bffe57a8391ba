//! Process-wide relay state shared by the loop, the HTTP surface, and the
//! shutdown sequence.
//!
//! Each field has a single writer:
//!
//! - the shutdown token is cancelled only by the shutdown coordinator
//! - the loop state is written only by the reconciliation loop (through
//!   [`TickGuard`] and at loop exit)
//! - the dedup store is mutated only by the loop; the status endpoint and
//!   flushes take the same lock briefly
//!
//! Flushes write a snapshot on the blocking pool, so the store lock is
//! never held across fsync. A separate write lock keeps two flushes from
//! racing on the same temp file.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::persistence::{DedupStore, PersistenceError};
use crate::types::{LoopState, TenantId};

/// Shared state passed to every component as `Arc<RelayContext>`.
#[derive(Debug)]
pub struct RelayContext {
    shutdown: CancellationToken,
    loop_state: AtomicU8,
    tick_running: AtomicBool,
    dedup: Mutex<DedupStore>,
    dedup_writer: Arc<Mutex<()>>,
    tenants: Vec<TenantId>,
}

impl RelayContext {
    pub fn new(dedup: DedupStore, tenants: Vec<TenantId>) -> Self {
        RelayContext {
            shutdown: CancellationToken::new(),
            loop_state: AtomicU8::new(LoopState::Idle as u8),
            tick_running: AtomicBool::new(false),
            dedup: Mutex::new(dedup),
            dedup_writer: Arc::new(Mutex::new(())),
            tenants,
        }
    }

    /// The shutdown flag. Cancelled exactly once, never reset.
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Sets the shutdown flag. Returns true for the call that flipped it.
    pub(crate) fn request_shutdown(&self) -> bool {
        let first = !self.shutdown.is_cancelled();
        self.shutdown.cancel();
        first
    }

    pub fn loop_state(&self) -> LoopState {
        LoopState::from_u8(self.loop_state.load(Ordering::Acquire))
    }

    pub(crate) fn set_loop_state(&self, state: LoopState) {
        self.loop_state.store(state as u8, Ordering::Release);
    }

    /// Tenants in processing order.
    pub fn tenants(&self) -> &[TenantId] {
        &self.tenants
    }

    pub fn dedup(&self) -> &Mutex<DedupStore> {
        &self.dedup
    }

    /// Number of ids recorded in the dedup store.
    pub async fn processed_count(&self) -> usize {
        self.dedup.lock().await.len()
    }

    /// Writes the dedup store to disk off the async runtime.
    ///
    /// Without `force`, a clean store is left alone. Returns the number of
    /// ids written, or `None` if nothing was written.
    pub async fn flush_dedup(&self, force: bool) -> Result<Option<usize>, PersistenceError> {
        let permit = self.dedup_writer.clone().lock_owned().await;

        let snapshot = {
            let store = self.dedup.lock().await;
            if !force && !store.is_dirty() {
                return Ok(None);
            }
            store.snapshot()
        };

        let snapshot = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            snapshot.write().map(|()| snapshot)
        })
        .await??;

        let count = snapshot.len();
        self.dedup.lock().await.record_flushed(&snapshot);
        Ok(Some(count))
    }

    /// Marks the start of a tick.
    ///
    /// Returns `None` if another tick is still running; overlapping ticks
    /// are never allowed.
    pub(crate) fn begin_tick(&self) -> Option<TickGuard<'_>> {
        self.tick_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.set_loop_state(LoopState::Processing);
        Some(TickGuard { ctx: self })
    }
}

/// Held for the duration of one tick. Dropping it marks the loop `Ready`.
#[derive(Debug)]
pub(crate) struct TickGuard<'a> {
    ctx: &'a RelayContext,
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.ctx.set_loop_state(LoopState::Ready);
        self.ctx.tick_running.store(false, Ordering::Release);
    }
}
