//! Exponential backoff retry for network calls.
//!
//! Components never retry on their own; callers decide. Two configurations
//! are used:
//!
//! - `FETCH`: 2 retries with 1s, 2s delays, for pending-message fetches
//!   inside a tick (a slow tenant must not hold up the others for long)
//! - `STARTUP`: 5 retries with 1s base and 8s cap, for the connector
//!   readiness probe at startup
//!
//! Only retriable errors are retried, and backoff sleeps end early when the
//! shutdown token is cancelled.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Errors that can tell whether repeating the call might succeed.
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

impl Retriable for crate::remote::TransportError {
    fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }
}

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap for exponential growth.
    pub max_delay: Duration,

    /// Multiplier applied per attempt (typically 2.0).
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Retry configuration for pending-message fetches.
    ///
    /// - 2 retries with 1s, 2s delays
    /// - Total max wait: 3 seconds per tenant
    pub const FETCH: Self = Self {
        max_retries: 2,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(4),
        backoff_multiplier: 2.0,
    };

    /// Retry configuration for the connector probe at startup.
    ///
    /// - 5 retries: 1s, 2s, 4s, 8s, 8s
    /// - Total max wait: 23 seconds
    pub const STARTUP: Self = Self {
        max_retries: 5,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(8),
        backoff_multiplier: 2.0,
    };

    /// Single attempt, no retries.
    pub const NONE: Self = Self {
        max_retries: 0,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        backoff_multiplier: 1.0,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Computes the delay for the given retry attempt (0-indexed).
    ///
    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }

    /// Returns an iterator over all retry delays.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }

    pub fn total_max_wait(&self) -> Duration {
        self.delays().sum()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::FETCH
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),

    /// Retriable errors until the attempts ran out.
    ExhaustedRetries { last_error: E, attempts: u32 },

    /// A non-retriable error; returned after the first occurrence.
    PermanentError(E),

    /// Shutdown was requested while waiting to retry.
    Cancelled { last_error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    /// Converts to a Result, keeping the last error of any failure.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::ExhaustedRetries { last_error, .. } => Err(last_error),
            RetryResult::PermanentError(e) => Err(e),
            RetryResult::Cancelled { last_error, .. } => Err(last_error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }
}

/// Executes an async operation, retrying retriable errors with backoff.
///
/// The operation is called at most `config.max_retries + 1` times. Backoff
/// sleeps race against `cancel`; a cancelled wait returns
/// `RetryResult::Cancelled` with the most recent error.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> RetryResult<T, E>
where
    E: Retriable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) => {
                attempt += 1;

                if !e.is_retriable() {
                    return RetryResult::PermanentError(e);
                }
                if attempt >= max_attempts {
                    return RetryResult::ExhaustedRetries {
                        last_error: e,
                        attempts: attempt,
                    };
                }

                let delay = config.delay_for_attempt(attempt - 1);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return RetryResult::Cancelled { last_error: e, attempts: attempt };
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
