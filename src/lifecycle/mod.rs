//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (gateway.rs):
//!     Load config → Validate → Build components → Start background tasks
//!     → Start listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Broadcast → Join tasks → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Background tasks are spawned through [`Shutdown`] so drain can join them
//! - Shutdown has a grace period; stragglers are aborted after it

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
