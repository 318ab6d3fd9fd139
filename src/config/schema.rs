//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Registry seed list.
    pub services: Vec<ServiceConfig>,

    /// Health probing and caching.
    pub health: HealthConfig,

    /// Metadata cache settings.
    pub metadata: MetadataConfig,

    /// Dispatch policy defaults.
    pub dispatch: DispatchConfig,

    /// Fan-out defaults.
    pub fanout: FanoutConfig,

    /// Inbound admission control.
    pub rate_limit: RateLimitConfig,

    /// Timeout configuration for the inbound side.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// One entry of the registry seed list.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Unique service identifier.
    pub id: String,

    /// Base address requests are resolved against (e.g., "http://10.0.0.5:3000").
    pub base_address: String,

    /// Capability tags this service serves.
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Per-call timeout in milliseconds.
    #[serde(default = "default_service_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_service_timeout_ms() -> u64 {
    5_000
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Enable the background refresh loop.
    pub enabled: bool,

    /// Background refresh interval in seconds.
    pub interval_secs: u64,

    /// How long a health record stays fresh, in seconds.
    pub ttl_secs: u64,

    /// Path to probe on every backend.
    pub path: String,

    /// Number of consecutive failures before a service is Offline.
    pub failure_threshold: u32,

    /// Maximum concurrent probes during a full sweep.
    pub max_parallelism: usize,
}

impl HealthConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            ttl_secs: 5,
            path: "/health".to_string(),
            failure_threshold: 3,
            max_parallelism: 20,
        }
    }
}

/// Metadata cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// How long fetched metadata stays fresh, in seconds.
    pub ttl_secs: u64,

    /// Path serving the capability listing on every backend.
    pub path: String,
}

impl MetadataConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            path: "/capabilities".to_string(),
        }
    }
}

/// Dispatch policy defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum attempts per target.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub backoff_base_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub backoff_cap_ms: u64,

    /// Skip targets the health monitor reports as Offline.
    pub respect_health: bool,

    /// Add up to 10% random jitter to each backoff delay.
    pub jitter: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 100,
            backoff_cap_ms: 2000,
            respect_health: false,
            jitter: false,
        }
    }
}

/// Fan-out defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Deadline applied when the caller does not supply one, in milliseconds.
    pub default_deadline_ms: u64,
}

impl FanoutConfig {
    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.default_deadline_ms)
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            default_deadline_ms: 2000,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Burst capacity per (client, route).
    pub burst: u32,

    /// Sustained refill rate per (client, route).
    pub rate_per_second: f64,

    /// Routes that bypass the bucket entirely.
    pub allowlist: Vec<String>,

    /// Buckets idle for longer than this are pruned, in seconds.
    pub idle_secs: u64,

    /// How often idle buckets are pruned, in seconds.
    pub prune_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            burst: 5,
            rate_per_second: 1.0,
            allowlist: vec!["/healthz".to_string()],
            idle_secs: 300,
            prune_interval_secs: 60,
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
