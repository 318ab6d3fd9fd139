//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the registry seed list (unique ids, parseable addresses)
//! - Validate value ranges (timeouts > 0, thresholds > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("service at index {0} has an empty id")]
    EmptyServiceId(usize),

    #[error("service '{0}' is declared more than once")]
    DuplicateServiceId(String),

    #[error("service '{id}' has invalid base address '{address}'")]
    InvalidBaseAddress { id: String, address: String },

    #[error("service '{0}' must have a timeout greater than zero")]
    ZeroServiceTimeout(String),

    #[error("{0} must be greater than zero")]
    NonPositive(&'static str),

    #[error("dispatch.backoff_cap_ms must be at least dispatch.backoff_base_ms")]
    BackoffCapBelowBase,

    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config
        .listener
        .bind_address
        .parse::<std::net::SocketAddr>()
        .is_err()
    {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let mut seen = HashSet::new();
    for (index, service) in config.services.iter().enumerate() {
        if service.id.trim().is_empty() {
            errors.push(ValidationError::EmptyServiceId(index));
            continue;
        }
        if !seen.insert(service.id.as_str()) {
            errors.push(ValidationError::DuplicateServiceId(service.id.clone()));
        }
        let scheme_ok = Url::parse(&service.base_address)
            .map(|url| url.scheme() == "http" && url.host().is_some())
            .unwrap_or(false);
        if !scheme_ok {
            errors.push(ValidationError::InvalidBaseAddress {
                id: service.id.clone(),
                address: service.base_address.clone(),
            });
        }
        if service.timeout_ms == 0 {
            errors.push(ValidationError::ZeroServiceTimeout(service.id.clone()));
        }
    }

    if config.health.ttl_secs == 0 {
        errors.push(ValidationError::NonPositive("health.ttl_secs"));
    }
    if config.health.failure_threshold == 0 {
        errors.push(ValidationError::NonPositive("health.failure_threshold"));
    }
    if config.health.max_parallelism == 0 {
        errors.push(ValidationError::NonPositive("health.max_parallelism"));
    }
    if config.health.enabled && config.health.interval_secs == 0 {
        errors.push(ValidationError::NonPositive("health.interval_secs"));
    }
    if config.metadata.ttl_secs == 0 {
        errors.push(ValidationError::NonPositive("metadata.ttl_secs"));
    }
    if config.dispatch.backoff_cap_ms < config.dispatch.backoff_base_ms {
        errors.push(ValidationError::BackoffCapBelowBase);
    }
    if config.fanout.default_deadline_ms == 0 {
        errors.push(ValidationError::NonPositive("fanout.default_deadline_ms"));
    }
    if config.rate_limit.enabled {
        if config.rate_limit.burst == 0 {
            errors.push(ValidationError::NonPositive("rate_limit.burst"));
        }
        let rate = config.rate_limit.rate_per_second;
        if !(rate > 0.0 && rate.is_finite()) {
            errors.push(ValidationError::NonPositive("rate_limit.rate_per_second"));
        }
        if config.rate_limit.prune_interval_secs == 0 {
            errors.push(ValidationError::NonPositive("rate_limit.prune_interval_secs"));
        }
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::NonPositive("timeouts.request_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
