//! Linear connect backoff.

use std::time::Duration;

/// Bounded retry schedule for connect attempts.
///
/// Failure `n` (1-based) waits `n × base_delay` before the next attempt.
/// Once more than `max_retries` failures have occurred the budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retrying after `failures` consecutive failures, or
    /// `None` when no retry is left.
    pub fn delay_for(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || failures > self.max_retries {
            return None;
        }
        Some(self.base_delay.saturating_mul(failures))
    }
}
