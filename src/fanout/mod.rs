//! Fan-out subsystem.
//!
//! # Data Flow
//! ```text
//! capability
//!     → registry.by_capability (empty: NoCandidates)
//!     → one Dispatcher::call per candidate, spawned on a JoinSet
//!     → collect completions until every task is done or the deadline fires
//!     → pending candidates become timed_out entries
//!     → sort by (latency, service id)
//!     → zero successes: AllFailed(report)
//! ```
//!
//! # Design Decisions
//! - The deadline is the only cancellation; abandoned calls are detached,
//!   never aborted mid-flight
//! - Partial success is a normal result

pub mod aggregator;
pub mod report;

pub use aggregator::FanoutAggregator;
pub use report::{EntryStatus, FanoutEntry, FanoutReport};
