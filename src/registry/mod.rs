//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! Config seed list / hot reload
//!     → descriptor.rs (validated ServiceDescriptor)
//!     → store.rs (upsert by id, capability index)
//!     → lookup by id (Dispatcher) / by capability (FanoutAggregator)
//! ```
//!
//! # Design Decisions
//! - Upsert never resets health history; only deregistration does
//! - Capability queries return candidates ascending by id so fan-out
//!   dispatch order is deterministic

pub mod descriptor;
pub mod store;

pub use descriptor::ServiceDescriptor;
pub use store::ServiceRegistry;
