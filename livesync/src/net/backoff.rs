//! Reconnect delay policy.

#[cfg(test)]
#[path = "backoff_test.rs"]
mod backoff_test;

use std::time::Duration;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Exponential backoff with a hard cap and a bounded number of attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first reconnect attempt.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub max: Duration,
    /// Reconnect attempts allowed before giving up.
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { base: DEFAULT_BASE_DELAY, max: DEFAULT_MAX_DELAY, max_attempts: DEFAULT_MAX_ATTEMPTS }
    }
}

impl Backoff {
    /// Delay to wait before reconnect attempt `attempt` (zero-based):
    /// `min(base * 2^attempt, max)`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let Some(factor) = 1_u32.checked_shl(attempt) else {
            return self.max;
        };
        self.base.checked_mul(factor).map_or(self.max, |d| d.min(self.max))
    }

    /// Whether `attempt` reconnects have already been spent.
    #[must_use]
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}
