//! Retry backoff policy: decides how soon a retryable failure runs again.

use chrono::Duration;

/// Bounded doubling backoff for retryable failures.
///
/// The delay after the n-th consecutive failure is `base * 2^(n-1)`, clamped
/// to `cap` and always kept strictly below the work's own repeat interval —
/// a retry that lands at or past the next regular run would be pointless.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Absolute ceiling on any retry delay.
    pub cap: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before the next retry, given the number of consecutive failures
    /// so far (1-indexed: the first failure passes 1) and the entry's repeat
    /// interval.
    pub fn delay(&self, consecutive_failures: u32, every: Duration) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(30);
        let factor = 1i32 << exponent;
        let raw = self.base.checked_mul(factor).unwrap_or(self.cap).min(self.cap);

        // Strictly below the interval: a periodic entry must never wait a
        // full period for a "sooner" retry.
        let below_interval = every - Duration::seconds(1);
        raw.min(below_interval).max(Duration::zero())
    }
}
