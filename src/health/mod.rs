//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     check / get_cached / periodic sweep
//!     → singleflight.rs (one probe per service in flight)
//!     → Probe backend under its declared timeout
//!     → Update state.rs
//!
//! Passive health checks (passive.rs):
//!     Dispatcher outcome observed
//!     → Same transition rules as probes
//!     → Update state.rs
//!
//! State machine (state.rs):
//!     Online → Degraded → Offline, Online again after one success
//!
//! Metadata (metadata.rs):
//!     Capability listings behind their own TTL, also single-flight
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - Health state is per-backend and survives registry upserts
//! - All health reads go through [`HealthMonitor`]

pub mod active;
pub mod metadata;
pub mod passive;
pub mod singleflight;
pub mod state;

pub use active::{HealthMonitor, HealthSummary};
pub use metadata::MetadataCache;
pub use passive::Observation;
pub use state::{HealthRecord, HealthStatus, HealthStore};
