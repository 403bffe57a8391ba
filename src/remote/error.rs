//! Remote API error types.
//!
//! Errors are categorized so the reconciliation loop can decide whether a
//! failed fetch is worth retrying within the same tick:
//!
//! - **Transient** errors are retriable (5xx, 429, 408, timeouts, connection failures)
//! - **Permanent** errors are not (other 4xx, malformed payloads)
//!
//! Either way the failure stays isolated to one tenant or one message.

use std::fmt;
use thiserror::Error;

/// The kind of transport error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Safe to retry with backoff.
    Transient,

    /// Retrying would fail the same way.
    Permanent,
}

impl TransportErrorKind {
    pub fn is_retriable(&self) -> bool {
        matches!(self, TransportErrorKind::Transient)
    }
}

/// A failure talking to the remote API.
#[derive(Debug, Error)]
pub struct TransportError {
    pub kind: TransportErrorKind,

    /// The HTTP status code, if a response was received.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,

    /// The underlying reqwest error, if any.
    #[source]
    pub source: Option<reqwest::Error>,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "remote API error (HTTP {}): {}", code, self.message),
            None => write!(f, "remote API error: {}", self.message),
        }
    }
}

impl TransportError {
    /// Creates an error for a non-success HTTP status.
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            kind: classify_status(status_code),
            status_code: Some(status_code),
            message: message.into(),
            source: None,
        }
    }

    /// Wraps a reqwest error, categorizing it by what went wrong.
    pub fn from_reqwest(context: impl Into<String>, source: reqwest::Error) -> Self {
        let status_code = source.status().map(|s| s.as_u16());
        let kind = if source.is_timeout() || source.is_connect() || source.is_request() {
            TransportErrorKind::Transient
        } else if let Some(code) = status_code {
            classify_status(code)
        } else if source.is_decode() || source.is_body() {
            TransportErrorKind::Permanent
        } else {
            TransportErrorKind::Transient
        };

        Self {
            kind,
            status_code,
            message: format!("{}: {}", context.into(), source),
            source: Some(source),
        }
    }

    /// Creates an error for a response body that could not be understood.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transient error without an underlying source.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Transient,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }
}

fn classify_status(code: u16) -> TransportErrorKind {
    match code {
        408 | 429 => TransportErrorKind::Transient,
        500..=599 => TransportErrorKind::Transient,
        _ => TransportErrorKind::Permanent,
    }
}
