//! Randomized pacing between sends.
//!
//! The downstream messaging network flags accounts that send at a machine
//! rhythm. After every send the loop waits a uniformly random delay in
//! `[min, max]` (1 to 8 seconds by default). Pacing is throttling only;
//! correctness never depends on it.

use std::time::Duration;

use rand::Rng;

const DEFAULT_MIN_SECS: u64 = 1;
const DEFAULT_MAX_SECS: u64 = 8;

/// Bounds for the delay between consecutive sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    pub min: Duration,
    pub max: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        PacingConfig {
            min: Duration::from_secs(DEFAULT_MIN_SECS),
            max: Duration::from_secs(DEFAULT_MAX_SECS),
        }
    }
}

impl PacingConfig {
    /// Creates a pacing range. Reversed bounds are swapped.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            PacingConfig { min, max }
        } else {
            PacingConfig { min: max, max: min }
        }
    }

    /// No delay between sends.
    pub fn disabled() -> Self {
        PacingConfig {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.max.is_zero()
    }

    /// Draws the next delay.
    pub fn next_delay(&self) -> Duration {
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        if min_ms >= max_ms {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_range_is_1_to_8_seconds() {
        let pacing = PacingConfig::default();
        assert_eq!(pacing.min, Duration::from_secs(1));
        assert_eq!(pacing.max, Duration::from_secs(8));
    }

    #[test]
    fn disabled_yields_zero() {
        let pacing = PacingConfig::disabled();
        assert!(pacing.is_disabled());
        assert_eq!(pacing.next_delay(), Duration::ZERO);
    }

    #[test]
    fn equal_bounds_yield_exact_delay() {
        let pacing = PacingConfig::new(Duration::from_secs(3), Duration::from_secs(3));
        assert_eq!(pacing.next_delay(), Duration::from_secs(3));
    }

    proptest! {
        #[test]
        fn delay_stays_within_bounds(a in 0u64..20_000, b in 0u64..20_000) {
            let pacing = PacingConfig::new(Duration::from_millis(a), Duration::from_millis(b));
            let delay = pacing.next_delay();
            prop_assert!(delay >= pacing.min);
            prop_assert!(delay <= pacing.max);
        }
    }
}
