//! Core domain types for the relay.
//!
//! Identifiers, the per-tick message values, and the loop state shared with
//! the status endpoint.

pub mod ids;
pub mod message;

pub use ids::{MessageId, TenantId};
pub use message::{DeliveryStatus, DispatchOutcome, LoopState, PendingMessage, PendingRecord};
