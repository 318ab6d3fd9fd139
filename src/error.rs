//! Gateway error taxonomy.
//!
//! Every rejected request carries exactly one [`ErrorKind`], so callers can
//! tell "nothing would serve this" (`NoCandidates`) apart from "everything
//! tried but failed" (`AllFailed`) and from "you are being throttled"
//! (`RateLimited`).

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::fanout::FanoutReport;

/// Classified outcome of a failed backend interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection could not be established or was reset.
    Connection,
    /// The backend did not answer within its declared timeout.
    Timeout,
    /// The backend rejected the request (4xx).
    Client,
    /// The backend failed to serve the request (5xx).
    Server,
    /// Local admission rejection; never reaches a backend.
    RateLimited,
    /// No registered backend advertises the capability.
    NoCandidates,
    /// The service id is not registered.
    NotFound,
    /// Every target in the chain was skipped as offline.
    Unavailable,
    /// Every fan-out candidate failed or timed out.
    AllFailed,
}

impl ErrorKind {
    /// Whether the dispatcher may retry after this failure.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::Server)
    }

    /// Whether this failure counts against the backend's health.
    ///
    /// A client error proves the backend is up and answering.
    pub fn counts_against_health(self) -> bool {
        self.is_retryable()
    }

    /// Stable name used in logs, metrics labels and error bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection_error",
            ErrorKind::Timeout => "timeout_error",
            ErrorKind::Client => "client_error",
            ErrorKind::Server => "server_error",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::NoCandidates => "no_candidates",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::AllFailed => "all_failed",
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced across component boundaries.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Lookup of an unregistered service.
    #[error("service '{0}' is not registered")]
    NotFound(String),

    /// Admission rejected by the rate limiter.
    #[error("rate limit exceeded for client '{client}' on route '{route}'")]
    RateLimited { client: String, route: String },

    /// Capability has zero registered backends.
    #[error("no backend advertises capability '{0}'")]
    NoCandidates(String),

    /// Every fan-out candidate failed or timed out.
    #[error("no candidate succeeded ({0})")]
    AllFailed(Box<FanoutReport>),

    /// A single dispatch ended in a classified failure.
    #[error("dispatch to '{service_id}' failed: {kind}")]
    Dispatch { service_id: String, kind: ErrorKind },
}

impl GatewayError {
    /// The taxonomy kind carried by this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::RateLimited { .. } => ErrorKind::RateLimited,
            GatewayError::NoCandidates(_) => ErrorKind::NoCandidates,
            GatewayError::AllFailed(_) => ErrorKind::AllFailed,
            GatewayError::Dispatch { kind, .. } => *kind,
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
