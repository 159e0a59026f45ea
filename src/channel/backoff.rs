//! Reconnect and give-up policy
//!
//! Pure decision logic: no timers, no IO. The stream client and poll
//! loop consult these and act on the answers.

use std::time::Duration;

/// Consecutive network-class failures tolerated before giving up.
pub const NETWORK_FAILURE_LIMIT: u32 = 2;

/// Linear backoff bounded by an attempt budget.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before reconnect `attempt` (1-based): `base_delay * attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    pub fn attempts_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

/// Stop decision over a consecutive-failure streak.
#[derive(Debug, Clone, Copy)]
pub struct FailurePolicy {
    pub max_consecutive: u32,
}

impl FailurePolicy {
    pub fn new(max_consecutive: u32) -> Self {
        Self { max_consecutive }
    }

    /// True when the streak warrants stopping: the generic threshold is
    /// reached, or [`NETWORK_FAILURE_LIMIT`] when the current failure is
    /// network-class.
    pub fn should_stop(&self, streak: u32, network_class: bool) -> bool {
        if network_class {
            streak >= NETWORK_FAILURE_LIMIT
        } else {
            streak >= self.max_consecutive
        }
    }
}

/// Count of consecutive unsuccessful operations since the last success.
#[derive(Debug, Default)]
pub struct FailureStreak {
    count: u32,
}

impl FailureStreak {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure and returns the new streak length.
    pub fn record(&mut self) -> u32 {
        self.count += 1;
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}
