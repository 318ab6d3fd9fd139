//! In-memory service registry.
//!
//! # Responsibilities
//! - Hold the known backend descriptors keyed by id
//! - Upsert without disturbing health history
//! - Resolve capability tags to a stable, id-ordered candidate list
//!
//! # Design Decisions
//! - Health records live in a store shared with the health monitor, so
//!   deregistration can drop them while upserts leave them alone
//! - No network I/O

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{GatewayError, GatewayResult};
use crate::health::state::HealthStore;
use crate::registry::descriptor::ServiceDescriptor;

/// Concurrent map of serviceId → descriptor.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: DashMap<String, Arc<ServiceDescriptor>>,
    health: Arc<HealthStore>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Health record store keyed by the same ids as this registry.
    pub fn health_store(&self) -> Arc<HealthStore> {
        Arc::clone(&self.health)
    }

    /// Insert or update a descriptor. Returns true when the id was new.
    pub fn register(&self, descriptor: ServiceDescriptor) -> bool {
        let id = descriptor.id.clone();
        let created = self
            .services
            .insert(id.clone(), Arc::new(descriptor))
            .is_none();
        if created {
            tracing::info!(service = %id, "Service registered");
        } else {
            tracing::debug!(service = %id, "Service descriptor updated");
        }
        created
    }

    /// Remove a descriptor and its health history.
    pub fn deregister(&self, id: &str) -> Option<Arc<ServiceDescriptor>> {
        let removed = self.services.remove(id).map(|(_, d)| d);
        self.health.remove(id);
        if removed.is_some() {
            tracing::info!(service = %id, "Service deregistered");
        }
        removed
    }

    pub fn lookup(&self, id: &str) -> GatewayResult<Arc<ServiceDescriptor>> {
        self.services
            .get(id)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.services.contains_key(id)
    }

    /// Every descriptor advertising `tag`, ascending by id.
    pub fn by_capability(&self, tag: &str) -> Vec<Arc<ServiceDescriptor>> {
        let mut matches: Vec<_> = self
            .services
            .iter()
            .filter(|entry| entry.value().has_capability(tag))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches
    }

    /// Every descriptor, ascending by id.
    pub fn all(&self) -> Vec<Arc<ServiceDescriptor>> {
        let mut all: Vec<_> = self
            .services
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Make the registry hold exactly `descriptors`.
    ///
    /// Retained ids are upserted (keeping their health), missing ids are
    /// deregistered. Returns the ids that were removed.
    pub fn sync(&self, descriptors: Vec<ServiceDescriptor>) -> Vec<String> {
        let wanted: HashSet<String> = descriptors.iter().map(|d| d.id.clone()).collect();
        for descriptor in descriptors {
            self.register(descriptor);
        }

        let stale: Vec<String> = self
            .services
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|id| !wanted.contains(id))
            .collect();
        for id in &stale {
            self.deregister(id);
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::health::passive::{apply, Observation, TransitionRules};
    use std::time::{Duration, Instant};
    use url::Url;

    fn svc(id: &str, port: u16, caps: &[&str]) -> ServiceDescriptor {
        ServiceDescriptor::new(
            id,
            Url::parse(&format!("http://127.0.0.1:{port}")).unwrap(),
            caps.iter().copied(),
            Duration::from_secs(1),
        )
    }

    fn fail_once(registry: &ServiceRegistry, id: &str) {
        let rules = TransitionRules {
            failure_threshold: 3,
            ttl: Duration::from_secs(5),
        };
        registry.health_store().update(id, |prev| {
            apply(
                id,
                prev,
                Observation::failure(ErrorKind::Timeout, Duration::ZERO),
                rules,
                Instant::now(),
            )
        });
    }

    #[test]
    fn test_lookup_and_not_found() {
        let registry = ServiceRegistry::new();
        assert!(registry.register(svc("a", 4000, &["search"])));
        assert_eq!(registry.lookup("a").unwrap().id, "a");
        let err = registry.lookup("missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_upsert_preserves_health() {
        let registry = ServiceRegistry::new();
        registry.register(svc("a", 4000, &["search"]));
        fail_once(&registry, "a");
        fail_once(&registry, "a");

        assert!(!registry.register(svc("a", 4999, &["search"])));

        let descriptor = registry.lookup("a").unwrap();
        assert_eq!(descriptor.base_address.port(), Some(4999));
        let record = registry.health_store().get("a").unwrap();
        assert_eq!(record.consecutive_failures, 2);
    }

    #[test]
    fn test_deregister_drops_health() {
        let registry = ServiceRegistry::new();
        registry.register(svc("a", 4000, &["search"]));
        fail_once(&registry, "a");

        assert!(registry.deregister("a").is_some());
        assert!(registry.health_store().get("a").is_none());
        assert!(registry.lookup("a").is_err());

        // Re-registering starts from a clean slate.
        registry.register(svc("a", 4000, &["search"]));
        assert!(registry.health_store().get("a").is_none());
    }

    #[test]
    fn test_by_capability_sorted_by_id() {
        let registry = ServiceRegistry::new();
        registry.register(svc("zeta", 4003, &["search"]));
        registry.register(svc("alpha", 4001, &["search", "enrichment"]));
        registry.register(svc("mid", 4002, &["enrichment"]));
        registry.register(svc("beta", 4004, &["search"]));

        let ids: Vec<_> = registry
            .by_capability("search")
            .iter()
            .map(|d| d.id.clone())
            .collect();
        assert_eq!(ids, vec!["alpha", "beta", "zeta"]);
        assert!(registry.by_capability("ranking").is_empty());
    }

    #[test]
    fn test_sync_removes_missing_and_keeps_retained_health() {
        let registry = ServiceRegistry::new();
        registry.register(svc("a", 4000, &["search"]));
        registry.register(svc("b", 4001, &["search"]));
        fail_once(&registry, "a");
        fail_once(&registry, "b");

        let removed = registry.sync(vec![svc("a", 4010, &["search"]), svc("c", 4002, &[])]);

        assert_eq!(removed, vec!["b".to_string()]);
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.health_store().get("a").unwrap().consecutive_failures,
            1
        );
        assert!(registry.health_store().get("b").is_none());
    }
}
