//! The gateway instance.
//!
//! # Responsibilities
//! - Build every component from configuration and wire them through `Arc`
//! - Own the live settings (dispatch policy, fan-out deadline)
//! - Start the background tasks and drain them on shutdown
//! - Apply reloaded configuration
//!
//! # Design Decisions
//! - One explicit instance instead of process-wide caches; tests build as
//!   many as they like
//! - Live settings sit behind an `ArcSwap`, so a reload never blocks a
//!   request in flight
//! - Health settings apply at startup; a reload changes the service set,
//!   dispatch defaults, fan-out deadline and rate limits

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;

use crate::config::{GatewayConfig, ServiceConfig};
use crate::dispatch::{DispatchResult, Dispatcher, Target};
use crate::error::GatewayResult;
use crate::fanout::{FanoutAggregator, FanoutReport};
use crate::health::{HealthMonitor, MetadataCache};
use crate::lifecycle::Shutdown;
use crate::registry::{ServiceDescriptor, ServiceRegistry};
use crate::resilience::DispatchPolicy;
use crate::security::RateLimiter;
use crate::transport::{GatewayRequest, HttpTransport, Transport};

/// Settings that may change on reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSettings {
    pub policy: DispatchPolicy,
    pub fanout_deadline: Duration,
}

impl From<&GatewayConfig> for LiveSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            policy: DispatchPolicy::from(&config.dispatch),
            fanout_deadline: config.fanout.default_deadline(),
        }
    }
}

pub struct Gateway {
    registry: Arc<ServiceRegistry>,
    health: Arc<HealthMonitor>,
    metadata: Arc<MetadataCache>,
    dispatcher: Arc<Dispatcher>,
    fanout: FanoutAggregator,
    limiter: Arc<RateLimiter>,
    settings: ArcSwap<LiveSettings>,
    rate_limit_idle: Duration,
    rate_limit_prune_every: Duration,
    metadata_prune_every: Duration,
    shutdown: Shutdown,
}

impl Gateway {
    /// Build a gateway talking HTTP to its backends.
    pub fn new(config: &GatewayConfig) -> Self {
        Self::with_transport(config, Arc::new(HttpTransport::new()))
    }

    pub fn with_transport(config: &GatewayConfig, transport: Arc<dyn Transport>) -> Self {
        let registry = Arc::new(ServiceRegistry::new());
        for descriptor in seed_descriptors(&config.services) {
            registry.register(descriptor);
        }

        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&transport),
            config.health.clone(),
        ));
        let metadata = Arc::new(MetadataCache::new(
            Arc::clone(&registry),
            Arc::clone(&transport),
            config.metadata.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&health),
            transport,
        ));
        let fanout = FanoutAggregator::new(Arc::clone(&registry), Arc::clone(&dispatcher));

        tracing::info!(services = registry.len(), "Gateway initialized");

        Self {
            registry,
            health,
            metadata,
            dispatcher,
            fanout,
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            settings: ArcSwap::from_pointee(LiveSettings::from(config)),
            rate_limit_idle: Duration::from_secs(config.rate_limit.idle_secs),
            rate_limit_prune_every: Duration::from_secs(config.rate_limit.prune_interval_secs),
            metadata_prune_every: config.metadata.ttl(),
            shutdown: Shutdown::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn metadata(&self) -> &Arc<MetadataCache> {
        &self.metadata
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn settings(&self) -> LiveSettings {
        **self.settings.load()
    }

    /// Dispatch under the live policy, optionally overriding `respect_health`.
    pub async fn dispatch(
        &self,
        target: &Target,
        request: &GatewayRequest,
        respect_health: Option<bool>,
    ) -> DispatchResult {
        let mut policy = self.settings().policy;
        if let Some(respect) = respect_health {
            policy = policy.with_respect_health(respect);
        }
        self.dispatcher.call(target, request, policy).await
    }

    /// Fan out under the live policy; `deadline` defaults to the configured one.
    pub async fn fanout(
        &self,
        capability: &str,
        request: GatewayRequest,
        deadline: Option<Duration>,
    ) -> GatewayResult<FanoutReport> {
        let settings = self.settings();
        let deadline = deadline.unwrap_or(settings.fanout_deadline);
        self.fanout
            .fanout(capability, request, deadline, settings.policy)
            .await
    }

    /// Remove a service along with its health record and cached metadata.
    pub fn deregister(&self, id: &str) -> Option<Arc<ServiceDescriptor>> {
        let removed = self.registry.deregister(id);
        self.metadata.invalidate(id);
        removed
    }

    /// Apply a reloaded configuration.
    pub fn apply_config(&self, config: &GatewayConfig) {
        let removed = self.registry.sync(seed_descriptors(&config.services));
        for id in &removed {
            self.metadata.invalidate(id);
        }
        self.settings.store(Arc::new(LiveSettings::from(config)));
        self.limiter.reconfigure(&config.rate_limit);

        tracing::info!(
            services = self.registry.len(),
            removed = removed.len(),
            "Configuration applied"
        );
    }

    /// Start the health loop, bucket pruning and, when given, the reload
    /// consumer.
    pub fn start(self: &Arc<Self>, reloads: Option<mpsc::UnboundedReceiver<GatewayConfig>>) {
        let health = Arc::clone(&self.health);
        self.shutdown
            .spawn("health-monitor", move |rx| health.run(rx));

        let limiter = Arc::clone(&self.limiter);
        let every = self.rate_limit_prune_every;
        let idle = self.rate_limit_idle;
        self.shutdown
            .spawn("rate-pruner", move |rx| limiter.run_pruner(every, idle, rx));

        let metadata = Arc::clone(&self.metadata);
        let every = self.metadata_prune_every;
        self.shutdown
            .spawn("metadata-pruner", move |rx| metadata.run_pruner(every, rx));

        if let Some(mut reloads) = reloads {
            let gateway = Arc::downgrade(self);
            self.shutdown.spawn("config-reload", move |mut rx| async move {
                loop {
                    tokio::select! {
                        update = reloads.recv() => {
                            let Some(config) = update else { break };
                            match gateway.upgrade() {
                                Some(gateway) => gateway.apply_config(&config),
                                None => break,
                            }
                        }
                        _ = rx.recv() => break,
                    }
                }
            });
        }
    }

    /// Stop background tasks, waiting up to `grace` for them to finish.
    pub async fn shutdown(&self, grace: Duration) {
        tracing::info!("Gateway draining");
        self.shutdown.drain(grace).await;
        tracing::info!("Gateway drained");
    }
}

/// Descriptors for the configured services; invalid entries are logged
/// and skipped.
fn seed_descriptors(services: &[ServiceConfig]) -> Vec<ServiceDescriptor> {
    services
        .iter()
        .filter_map(|service| match ServiceDescriptor::from_config(service) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                tracing::error!(
                    service = %service.id,
                    address = %service.base_address,
                    error = %e,
                    "Skipping service with invalid base address"
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::transport::mock::ScriptedTransport;

    const CONFIG: &str = r#"
        [[services]]
        id = "search-a"
        base_address = "http://127.0.0.1:9001"
        capabilities = ["search"]

        [[services]]
        id = "search-b"
        base_address = "http://127.0.0.1:9002"
        capabilities = ["search", "summarize"]

        [dispatch]
        max_retries = 2
    "#;

    fn gateway(config: &GatewayConfig) -> (Arc<Gateway>, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        let gateway = Arc::new(Gateway::with_transport(config, transport.clone()));
        (gateway, transport)
    }

    #[tokio::test]
    async fn test_seeds_registry_from_config() {
        let config = parse_config(CONFIG).unwrap();
        let (gateway, _transport) = gateway(&config);

        assert_eq!(gateway.registry().len(), 2);
        assert_eq!(gateway.registry().by_capability("summarize").len(), 1);
        assert_eq!(gateway.settings().policy.max_retries, 2);
    }

    #[tokio::test]
    async fn test_apply_config_syncs_registry_and_settings() {
        let config = parse_config(CONFIG).unwrap();
        let (gateway, _transport) = gateway(&config);
        gateway
            .dispatch(&Target::single("search-a"), &GatewayRequest::get("/q"), None)
            .await;
        assert!(gateway.health().status("search-a").is_some());

        let mut next = config.clone();
        next.services.retain(|s| s.id == "search-a");
        next.fanout.default_deadline_ms = 750;
        gateway.apply_config(&next);

        assert_eq!(gateway.registry().len(), 1);
        assert!(gateway.health().status("search-a").is_some());
        assert_eq!(gateway.settings().fanout_deadline, Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_deregister_drops_health_and_metadata() {
        let config = parse_config(CONFIG).unwrap();
        let (gateway, transport) = gateway(&config);
        transport.on_metadata("search-b", serde_json::json!({ "capabilities": ["summarize"] }));

        gateway.metadata().get("search-b").await.unwrap();
        gateway.health().check("search-b").await.unwrap();
        assert_eq!(gateway.metadata().len(), 1);

        assert!(gateway.deregister("search-b").is_some());
        assert!(gateway.metadata().is_empty());
        assert!(gateway.health().status("search-b").is_none());
        assert!(matches!(
            gateway.metadata().get("search-b").await,
            Err(crate::error::GatewayError::NotFound(_))
        ));
        assert!(gateway.deregister("search-b").is_none());
    }

    #[tokio::test]
    async fn test_start_and_drain() {
        let config = parse_config(CONFIG).unwrap();
        let (gateway, transport) = gateway(&config);
        let (tx, rx) = mpsc::unbounded_channel();

        gateway.start(Some(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.health_calls("search-a"), 1);

        let mut next = config.clone();
        next.services.clear();
        tx.send(next).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gateway.registry().is_empty());

        tokio::time::timeout(Duration::from_secs(2), gateway.shutdown(Duration::from_secs(1)))
            .await
            .expect("drain did not finish");
    }
}
