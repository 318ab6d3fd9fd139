//! Metadata cache.
//!
//! Capability listings change far less often than liveness, so they get
//! their own TTL (30s by default) independent of the health records. Reads
//! follow the same single-flight rule as health probes. Failed fetches are
//! not cached; the next read tries again. Documents of deregistered
//! services and expired documents are pruned on an interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::MetadataConfig;
use crate::error::{ErrorKind, GatewayError, GatewayResult};
use crate::health::singleflight::SingleFlight;
use crate::registry::ServiceRegistry;
use crate::resilience::timeouts::with_timeout;
use crate::transport::Transport;

#[derive(Debug, Clone)]
struct CachedDocument {
    expires_at: Instant,
    document: Arc<Value>,
}

pub struct MetadataCache {
    registry: Arc<ServiceRegistry>,
    transport: Arc<dyn Transport>,
    config: MetadataConfig,
    entries: Arc<DashMap<String, CachedDocument>>,
    flights: SingleFlight<String, Result<Arc<Value>, ErrorKind>>,
}

impl MetadataCache {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        transport: Arc<dyn Transport>,
        config: MetadataConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            config,
            entries: Arc::new(DashMap::new()),
            flights: SingleFlight::new(),
        }
    }

    /// Metadata document for a service, fetched when missing or expired.
    pub async fn get(&self, service_id: &str) -> GatewayResult<Arc<Value>> {
        let service = self.registry.lookup(service_id)?;

        if let Some(cached) = self.entries.get(service_id) {
            if Instant::now() < cached.expires_at {
                return Ok(Arc::clone(&cached.document));
            }
        }

        let registry = Arc::clone(&self.registry);
        let entries = Arc::clone(&self.entries);
        let transport = Arc::clone(&self.transport);
        let path = self.config.path.clone();
        let ttl = self.config.ttl();

        self.flights
            .run(service.id.clone(), move || async move {
                let document = with_timeout(
                    service.declared_timeout,
                    transport.fetch_json(&service, &path),
                )
                .await
                .map_err(|kind| {
                    tracing::warn!(service = %service.id, error = %kind, "Metadata fetch failed");
                    kind
                })?;

                let document = Arc::new(document);
                entries.insert(
                    service.id.clone(),
                    CachedDocument {
                        expires_at: Instant::now() + ttl,
                        document: Arc::clone(&document),
                    },
                );
                // Deregistered while fetching; serve the document but keep no copy.
                if !registry.contains(&service.id) {
                    entries.remove(&service.id);
                }
                Ok(document)
            })
            .await
            .map_err(|kind| GatewayError::Dispatch {
                service_id: service_id.to_string(),
                kind,
            })
    }

    /// Forget the cached document for a service.
    pub fn invalidate(&self, service_id: &str) {
        self.entries.remove(service_id);
    }

    /// Drop expired documents and those of services that are no longer
    /// registered. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|id, cached| now < cached.expires_at && self.registry.contains(id));
        before.saturating_sub(self.entries.len())
    }

    /// Prune loop; runs every `every` until shutdown fires.
    pub async fn run_pruner(self: Arc<Self>, every: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.prune();
                    if removed > 0 {
                        tracing::debug!(removed, "Pruned metadata documents");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Metadata pruner received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
