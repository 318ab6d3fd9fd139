//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or config)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (service, route, attempt) rather than formatted text
//! - Request ID flows through every inbound request
//! - Metric updates go through the `metrics` facade; with no recorder
//!   installed they are no-ops

pub mod logging;
pub mod metrics;
