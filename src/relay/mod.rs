//! The relay core: shared context, pacing, and the reconciliation loop.

mod pacing;
mod reconcile;
mod state;

pub use pacing::PacingConfig;
pub use reconcile::{LoopConfig, ReconciliationLoop, TickReport};
pub use state::RelayContext;
