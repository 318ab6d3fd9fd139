//! Retry policy.
//!
//! # Responsibilities
//! - Bound the attempts made against one target
//! - Compute the wait after each retryable failure
//! - Carry the health-aware routing switch
//!
//! # Design Decisions
//! - Connection errors, timeouts and 5xx are retryable; 4xx never are
//! - The backoff wait follows every retryable failure, including the last
//!   attempt on a target, so a failover hop is also spaced out

use std::time::Duration;

use crate::config::DispatchConfig;
use crate::resilience::backoff::{calculate_backoff, calculate_backoff_with_jitter};

/// Policy for one dispatched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Attempts per target, including the first.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Skip targets currently reported Offline.
    pub respect_health: bool,
    pub jitter: bool,
}

impl DispatchPolicy {
    /// Attempts made against each target; never less than one.
    pub fn attempts_per_target(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Wait after the failed attempt numbered `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if self.jitter {
            calculate_backoff_with_jitter(attempt, self.backoff_base, self.backoff_cap)
        } else {
            calculate_backoff(attempt, self.backoff_base, self.backoff_cap)
        }
    }

    pub fn with_respect_health(mut self, respect_health: bool) -> Self {
        self.respect_health = respect_health;
        self
    }
}

impl From<&DispatchConfig> for DispatchPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_cap: Duration::from_millis(config.backoff_cap_ms),
            respect_health: config.respect_health,
            jitter: config.jitter,
        }
    }
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}
