//! Token bucket rate limiting per (client, route).
//!
//! # Responsibilities
//! - Admit or reject each request against its own bucket
//! - Let allowlisted routes through without touching any bucket
//! - Keep the bucket map bounded by pruning idle entries
//!
//! # Design Decisions
//! - Lazy refill on access, no timer per bucket
//! - Each bucket is updated under its DashMap shard guard, so two requests
//!   for the same key never both spend the last token
//! - Limits live behind an `ArcSwap` and can be replaced on config reload;
//!   existing buckets keep their tokens

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::RateLimitConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;

/// Header carrying an explicit client identity.
pub const X_CLIENT_ID: &str = "x-client-id";

/// A token bucket with lazy refill.
#[derive(Debug, Clone, Copy)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct Limits {
    enabled: bool,
    burst: f64,
    rate_per_second: f64,
    allowlist: HashSet<String>,
}

impl From<&RateLimitConfig> for Limits {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            burst: f64::from(config.burst),
            rate_per_second: config.rate_per_second,
            allowlist: config.allowlist.iter().cloned().collect(),
        }
    }
}

/// How a request got through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A token was spent.
    Admitted,
    /// The route is allowlisted or limiting is disabled.
    Bypassed,
}

pub struct RateLimiter {
    buckets: DashMap<(String, String), TokenBucket>,
    limits: ArcSwap<Limits>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            limits: ArcSwap::from_pointee(Limits::from(config)),
        }
    }

    /// Replace the limits; existing buckets keep their tokens.
    pub fn reconfigure(&self, config: &RateLimitConfig) {
        self.limits.store(Arc::new(Limits::from(config)));
    }

    pub fn check(&self, client: &str, route: &str) -> GatewayResult<Admission> {
        self.check_at(client, route, Instant::now())
    }

    /// Admission decision at an explicit instant.
    pub fn check_at(&self, client: &str, route: &str, now: Instant) -> GatewayResult<Admission> {
        let limits = self.limits.load();
        if !limits.enabled || limits.allowlist.contains(route) {
            return Ok(Admission::Bypassed);
        }

        let mut bucket = self
            .buckets
            .entry((client.to_string(), route.to_string()))
            .or_insert_with(|| TokenBucket::new(limits.burst, now));

        if bucket.try_acquire(limits.burst, limits.rate_per_second, now) {
            Ok(Admission::Admitted)
        } else {
            Err(GatewayError::RateLimited {
                client: client.to_string(),
                route: route.to_string(),
            })
        }
    }

    /// Drop buckets untouched for longer than `idle`; returns how many.
    pub fn prune(&self, idle: Duration) -> usize {
        self.prune_at(idle, Instant::now())
    }

    fn prune_at(&self, idle: Duration, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) <= idle);
        before.saturating_sub(self.buckets.len())
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Periodically prune idle buckets until shutdown fires.
    pub async fn run_pruner(
        self: Arc<Self>,
        every: Duration,
        idle: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = time::interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.prune(idle);
                    if removed > 0 {
                        tracing::debug!(removed, "Pruned idle rate buckets");
                    }
                    metrics::record_rate_buckets(self.bucket_count());
                }
                _ = shutdown.recv() => {
                    tracing::info!("Rate bucket pruner received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// Middleware applying the limiter to every routed request.
///
/// Client key: `x-client-id` when present, else the peer IP.
/// Route key: the matched route template, else the raw path.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = request
        .headers()
        .get(X_CLIENT_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    match limiter.check(&client, &route) {
        Ok(_) => next.run(request).await,
        Err(e) => {
            tracing::warn!(client = %client, route = %route, "Rate limit exceeded");
            metrics::record_rate_limited(&route);
            e.into_response()
        }
    }
}
