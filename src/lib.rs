//! Notice Relay - forwards queued notifications from a remote API to a local
//! messaging connector.
//!
//! The relay polls the remote API for each tenant's pending messages, sends
//! each one through the connector at most once, and reports the outcome back.
//! A local HTTP surface offers direct sends and a status snapshot.

pub mod app;
pub mod config;
pub mod connector;
pub mod persistence;
pub mod relay;
pub mod remote;
pub mod retry;
pub mod server;
pub mod shutdown;
pub mod types;

#[cfg(test)]
pub mod test_utils;
