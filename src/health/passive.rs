//! Health observations and the record transition they drive.
//!
//! # Responsibilities
//! - Describe one observed interaction with a backend (probe or real call)
//! - Fold an observation into the previous record
//!
//! # Design Decisions
//! - Probes and dispatched calls share one transition function
//! - Connection errors, timeouts and 5xx are failures
//! - 4xx are NOT failures (client error, not backend)

use std::time::{Duration, Instant};

use crate::error::ErrorKind;
use crate::health::state::{HealthRecord, HealthStatus};

/// One observed interaction with a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub latency: Duration,
    pub failure: Option<ErrorKind>,
}

impl Observation {
    pub fn success(latency: Duration) -> Self {
        Self {
            latency,
            failure: None,
        }
    }

    pub fn failure(kind: ErrorKind, latency: Duration) -> Self {
        Self {
            latency,
            failure: Some(kind),
        }
    }

    /// Observation derived from the outcome of a dispatched call.
    pub fn from_call(result: Result<(), ErrorKind>, latency: Duration) -> Self {
        match result {
            Err(kind) if kind.counts_against_health() => Self::failure(kind, latency),
            _ => Self::success(latency),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Rules applied when folding observations.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRules {
    pub failure_threshold: u32,
    pub ttl: Duration,
}

/// Build the next record for `service_id` from the previous one.
pub fn apply(
    service_id: &str,
    previous: Option<&HealthRecord>,
    observation: Observation,
    rules: TransitionRules,
    now: Instant,
) -> HealthRecord {
    let (status, consecutive_failures) = match observation.failure {
        None => (HealthStatus::Online, 0),
        Some(_) => {
            let failures = previous
                .map(|r| r.consecutive_failures)
                .unwrap_or(0)
                .saturating_add(1);
            let status = if failures >= rules.failure_threshold {
                HealthStatus::Offline
            } else {
                HealthStatus::Degraded
            };
            (status, failures)
        }
    };

    HealthRecord {
        service_id: service_id.to_string(),
        status,
        last_checked_at: now,
        latency: observation.latency,
        cache_expires_at: now + rules.ttl,
        consecutive_failures,
        last_error: observation.failure,
    }
}
