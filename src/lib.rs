//! Agent gateway library: service registry, health monitoring, dispatch
//! with failover, capability fan-out and rate limiting.

pub mod admin;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fanout;
pub mod gateway;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod security;
pub mod transport;

pub use config::schema::GatewayConfig;
pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
