use std::time::Duration;

/// Exponential backoff between fetch attempts.
///
/// Delay schedule with the defaults: 1s, 2s, 4s, 8s, 16s, 30s (capped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Wait before the first retry.
    pub initial: Duration,
    /// Growth factor per retry. A factor of 1 gives a fixed delay.
    pub multiplier: u32,
    /// Upper bound for any single wait.
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            multiplier: 2,
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffConfig {
    /// A constant delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial: delay,
            multiplier: 1,
            max: delay,
        }
    }

    /// No waiting at all. Useful in tests.
    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-indexed).
    ///
    /// Monotonically non-decreasing in `retry` and never above `max`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        let delay = self.initial.saturating_mul(factor);
        std::cmp::min(delay, self.max.max(self.initial))
    }
}
