//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (token bucket per client + route)
//!         → allowlisted route: bypass
//!         → token available: pass to handler
//!         → empty bucket: 429 with a JSON error body
//! ```
//!
//! # Design Decisions
//! - Rejections never reach a backend
//! - Client identity comes from `x-client-id`, falling back to the peer IP

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, Admission, RateLimiter};
