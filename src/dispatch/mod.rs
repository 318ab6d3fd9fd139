//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Target (one id or a failover chain)
//!     → For each id in order:
//!         → registry lookup (unknown id: NotFound hop, advance)
//!         → respect_health && Offline: skip without attempting
//!         → attempt under declared timeout
//!             → 2xx/3xx:  Success, stop
//!             → 4xx:      Failure, stop (no retry, no failover)
//!             → retryable: backoff, retry up to max_retries, then advance
//!         → every attempt reported to the HealthMonitor
//!     → DispatchResult
//! ```
//!
//! # Design Decisions
//! - `call` never returns an error; every path ends in a [`DispatchResult`]
//! - Attempts are counted across the whole chain
//! - The failover chain replaces per-provider fallback logic in callers

pub mod dispatcher;

use std::time::Duration;

use crate::error::{ErrorKind, GatewayError};
use crate::transport::Payload;

pub use dispatcher::Dispatcher;

/// Where a call may be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Single(String),
    /// Ordered failover chain; later ids are tried only when earlier ones
    /// exhaust their retries.
    Chain(Vec<String>),
}

impl Target {
    pub fn single(id: impl Into<String>) -> Self {
        Target::Single(id.into())
    }

    pub fn chain<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Target::Chain(ids.into_iter().map(Into::into).collect())
    }

    /// Service ids in the order they are tried.
    pub fn ids(&self) -> &[String] {
        match self {
            Target::Single(id) => std::slice::from_ref(id),
            Target::Chain(ids) => ids,
        }
    }
}

/// Final outcome of a dispatched call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success(Payload),
    /// `status` is the backend's own status code when it answered.
    Failure { kind: ErrorKind, status: Option<u16> },
}

impl DispatchOutcome {
    pub fn failure(kind: ErrorKind) -> Self {
        DispatchOutcome::Failure { kind, status: None }
    }
}

/// Result of one `Dispatcher::call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    /// Backend that produced the final outcome.
    pub service_id: String,
    pub outcome: DispatchOutcome,
    /// Wall time of the whole call, backoff waits included.
    pub latency: Duration,
    /// Network attempts across the whole chain.
    pub attempts: u32,
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Success(_))
    }

    /// Failure kind, `None` on success.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.outcome {
            DispatchOutcome::Success(_) => None,
            DispatchOutcome::Failure { kind, .. } => Some(kind),
        }
    }

    /// The payload, or the failure as a [`GatewayError`].
    pub fn into_payload(self) -> Result<Payload, GatewayError> {
        match self.outcome {
            DispatchOutcome::Success(payload) => Ok(payload),
            DispatchOutcome::Failure { kind, .. } => Err(GatewayError::Dispatch {
                service_id: self.service_id,
                kind,
            }),
        }
    }
}
