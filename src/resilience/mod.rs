//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to backend:
//!     → timeouts.rs (enforce the target's declared timeout)
//!     → On retryable failure: retries.rs policy + backoff.rs delay
//!     → Attempts exhausted: Dispatcher advances the failover chain
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only connection errors, timeouts and 5xx are retried
//! - Backoff is capped so a single call's worst case is predictable

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::DispatchPolicy;
