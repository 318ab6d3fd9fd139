//! Active health checking.
//!
//! # Responsibilities
//! - Probe backends on demand (`check`) and through the TTL cache
//!   (`get_cached`)
//! - Periodically refresh every registered backend (`run`)
//! - Fold passive observations from the dispatcher into the same records
//!
//! # Design Decisions
//! - At most one probe per service is in flight; `check` and `get_cached`
//!   share the same [`SingleFlight`] so either joins the other's probe
//! - Probe failures never leave the monitor; every probe ends in a written
//!   record and a log line
//! - Probes run under the service's declared timeout

use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthConfig;
use crate::error::GatewayResult;
use crate::health::passive::{self, Observation, TransitionRules};
use crate::health::singleflight::SingleFlight;
use crate::health::state::{HealthRecord, HealthStatus, HealthStore};
use crate::observability::metrics;
use crate::registry::{ServiceDescriptor, ServiceRegistry};
use crate::resilience::timeouts::with_timeout;
use crate::transport::Transport;

/// Counts per status from one `check_all` sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub online: usize,
    pub degraded: usize,
    pub offline: usize,
    pub total: usize,
}

impl HealthSummary {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a HealthRecord>) -> Self {
        let mut summary = Self::default();
        for record in records {
            match record.status {
                HealthStatus::Online => summary.online += 1,
                HealthStatus::Degraded => summary.degraded += 1,
                HealthStatus::Offline => summary.offline += 1,
            }
            summary.total += 1;
        }
        summary
    }
}

pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    store: Arc<HealthStore>,
    transport: Arc<dyn Transport>,
    config: HealthConfig,
    flights: SingleFlight<String, Arc<HealthRecord>>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        transport: Arc<dyn Transport>,
        config: HealthConfig,
    ) -> Self {
        let store = registry.health_store();
        Self {
            registry,
            store,
            transport,
            config,
            flights: SingleFlight::new(),
        }
    }

    fn rules(&self) -> TransitionRules {
        TransitionRules {
            failure_threshold: self.config.failure_threshold,
            ttl: self.config.ttl(),
        }
    }

    /// Probe one service now and return the record it produced.
    pub async fn check(&self, service_id: &str) -> GatewayResult<Arc<HealthRecord>> {
        let service = self.registry.lookup(service_id)?;
        Ok(self.probe_coalesced(service).await)
    }

    /// Return the cached record if it is still fresh, otherwise probe.
    pub async fn get_cached(&self, service_id: &str) -> GatewayResult<Arc<HealthRecord>> {
        let service = self.registry.lookup(service_id)?;
        if let Some(record) = self.store.get(service_id) {
            if record.is_fresh(Instant::now()) {
                return Ok(record);
            }
        }
        Ok(self.probe_coalesced(service).await)
    }

    /// Probe every registered service, at most `max_parallelism` at a time.
    pub async fn check_all(&self) -> HealthSummary {
        let services = self.registry.all();
        self.store.retain(|id| self.registry.contains(id));

        let records: Vec<Arc<HealthRecord>> = stream::iter(services)
            .map(|service| self.probe_coalesced(service))
            .buffer_unordered(self.config.max_parallelism.max(1))
            .collect()
            .await;

        let summary = HealthSummary::tally(records.iter().map(AsRef::as_ref));
        tracing::debug!(
            online = summary.online,
            degraded = summary.degraded,
            offline = summary.offline,
            "Health sweep complete"
        );
        summary
    }

    /// Fold a passive observation into the service's record.
    ///
    /// Observations for services that are no longer registered are dropped.
    pub fn observe(&self, service_id: &str, observation: Observation) -> Option<Arc<HealthRecord>> {
        record_registered(
            &self.registry,
            &self.store,
            service_id,
            observation,
            self.rules(),
        )
    }

    /// Current record without probing; `None` when never observed.
    pub fn status(&self, service_id: &str) -> Option<Arc<HealthRecord>> {
        self.store.get(service_id)
    }

    /// Refresh loop; sweeps every `interval_secs` until shutdown fires.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn probe_coalesced(&self, service: Arc<ServiceDescriptor>) -> Arc<HealthRecord> {
        let probe = Probe {
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
            transport: Arc::clone(&self.transport),
            path: self.config.path.clone(),
            rules: self.rules(),
        };
        self.flights
            .run(service.id.clone(), move || probe.run(service))
            .await
    }
}

/// Everything one detached probe needs, owned so the flight is `'static`.
struct Probe {
    registry: Arc<ServiceRegistry>,
    store: Arc<HealthStore>,
    transport: Arc<dyn Transport>,
    path: String,
    rules: TransitionRules,
}

impl Probe {
    async fn run(self, service: Arc<ServiceDescriptor>) -> Arc<HealthRecord> {
        let started = Instant::now();
        let result = with_timeout(
            service.declared_timeout,
            self.transport.probe(&service, &self.path),
        )
        .await;
        let latency = started.elapsed();
        metrics::record_probe(&service.id, result.is_ok(), latency);

        let observation = match result {
            Ok(()) => Observation::success(latency),
            Err(kind) => {
                tracing::warn!(
                    service = %service.id,
                    error = %kind,
                    latency_ms = latency.as_millis() as u64,
                    "Health probe failed"
                );
                Observation::failure(kind, latency)
            }
        };

        match record_registered(&self.registry, &self.store, &service.id, observation, self.rules) {
            Some(record) => record,
            // Deregistered while probing; report without storing.
            None => Arc::new(passive::apply(
                &service.id,
                None,
                observation,
                self.rules,
                Instant::now(),
            )),
        }
    }
}

/// Store an observation only while the service is registered.
///
/// `deregister` drops the descriptor before the record, so re-checking the
/// registry after the write undoes any write that raced a deregistration.
fn record_registered(
    registry: &ServiceRegistry,
    store: &HealthStore,
    service_id: &str,
    observation: Observation,
    rules: TransitionRules,
) -> Option<Arc<HealthRecord>> {
    if !registry.contains(service_id) {
        return None;
    }
    let written = record(store, service_id, observation, rules);
    if !registry.contains(service_id) {
        store.remove(service_id);
        return None;
    }
    Some(written)
}

fn record(
    store: &HealthStore,
    service_id: &str,
    observation: Observation,
    rules: TransitionRules,
) -> Arc<HealthRecord> {
    let mut previous = None;
    let record = store.update(service_id, |prev| {
        previous = prev.map(|r| r.status);
        passive::apply(service_id, prev, observation, rules, Instant::now())
    });

    if previous != Some(record.status) {
        tracing::info!(
            service = %service_id,
            from = previous.map(HealthStatus::as_str).unwrap_or("unknown"),
            to = record.status.as_str(),
            failures = record.consecutive_failures,
            "Backend health changed"
        );
    }
    metrics::record_backend_health(service_id, record.status);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, GatewayError};
    use crate::transport::mock::{Behaviour, ScriptedTransport};
    use std::time::Duration;
    use url::Url;

    fn descriptor(id: &str, timeout: Duration) -> ServiceDescriptor {
        let url = Url::parse(&format!("http://{id}.test")).unwrap();
        ServiceDescriptor::new(id, url, ["search"], timeout)
    }

    fn setup(ids: &[&str]) -> (HealthMonitor, Arc<ScriptedTransport>) {
        let registry = Arc::new(ServiceRegistry::new());
        for id in ids {
            registry.register(descriptor(id, Duration::from_secs(1)));
        }
        let transport = Arc::new(ScriptedTransport::new());
        let monitor = HealthMonitor::new(registry, transport.clone(), HealthConfig::default());
        (monitor, transport)
    }

    #[tokio::test]
    async fn test_concurrent_reads_share_one_probe() {
        let (monitor, transport) = setup(&["a"]);
        transport.on_health("a", vec![Behaviour::ok("up").after(Duration::from_millis(50))]);

        let reads = (0..50).map(|_| monitor.get_cached("a"));
        let records = futures_util::future::join_all(reads).await;

        assert_eq!(transport.health_calls("a"), 1);
        let first = records[0].as_ref().unwrap();
        for record in &records {
            let record = record.as_ref().unwrap();
            assert!(Arc::ptr_eq(first, record));
            assert_eq!(record.status, HealthStatus::Online);
        }
    }

    #[tokio::test]
    async fn test_fresh_record_is_served_from_cache() {
        let (monitor, transport) = setup(&["a"]);

        monitor.get_cached("a").await.unwrap();
        monitor.get_cached("a").await.unwrap();

        assert_eq!(transport.health_calls("a"), 1);
    }

    #[tokio::test]
    async fn test_expired_record_is_reprobed() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.register(descriptor("a", Duration::from_secs(1)));
        let transport = Arc::new(ScriptedTransport::new());
        let config = HealthConfig {
            ttl_secs: 0,
            ..HealthConfig::default()
        };
        let monitor = HealthMonitor::new(registry, transport.clone(), config);

        monitor.get_cached("a").await.unwrap();
        monitor.get_cached("a").await.unwrap();

        assert_eq!(transport.health_calls("a"), 2);
    }

    #[tokio::test]
    async fn test_probe_state_machine() {
        let (monitor, transport) = setup(&["a"]);
        transport.on_health("a", vec![Behaviour::refuse()]);

        let record = monitor.check("a").await.unwrap();
        assert_eq!(record.status, HealthStatus::Degraded);
        let record = monitor.check("a").await.unwrap();
        assert_eq!(record.status, HealthStatus::Degraded);
        let record = monitor.check("a").await.unwrap();
        assert_eq!(record.status, HealthStatus::Offline);
        assert_eq!(record.consecutive_failures, 3);
        assert_eq!(record.last_error, Some(ErrorKind::Connection));

        transport.on_health("a", vec![Behaviour::ok("up")]);
        let record = monitor.check("a").await.unwrap();
        assert_eq!(record.status, HealthStatus::Online);
        assert_eq!(record.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_non_2xx_probe_is_failure() {
        let (monitor, transport) = setup(&["a"]);
        transport.on_health("a", vec![Behaviour::status(404)]);

        let record = monitor.check("a").await.unwrap();

        assert_eq!(record.status, HealthStatus::Degraded);
        assert_eq!(record.last_error, Some(ErrorKind::Client));
    }

    #[tokio::test]
    async fn test_probe_honours_declared_timeout() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.register(descriptor("slow", Duration::from_millis(50)));
        let transport = Arc::new(ScriptedTransport::new());
        transport.on_health("slow", vec![Behaviour::Hang]);
        let monitor = HealthMonitor::new(registry, transport, HealthConfig::default());

        let started = Instant::now();
        let record = monitor.check("slow").await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(record.last_error, Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_unknown_service_is_not_probed() {
        let (monitor, transport) = setup(&[]);

        let result = monitor.get_cached("ghost").await;

        assert!(matches!(result, Err(GatewayError::NotFound(_))));
        assert_eq!(transport.health_calls("ghost"), 0);
    }

    #[tokio::test]
    async fn test_check_all_survives_one_failure() {
        let (monitor, transport) = setup(&["a", "b", "c"]);
        transport.on_health("b", vec![Behaviour::refuse()]);

        let summary = monitor.check_all().await;

        assert_eq!(
            summary,
            HealthSummary {
                online: 2,
                degraded: 1,
                offline: 0,
                total: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_check_all_drops_stale_records() {
        let (monitor, _transport) = setup(&["a"]);
        monitor.store.update("b", |prev| {
            passive::apply(
                "b",
                prev,
                Observation::success(Duration::ZERO),
                monitor.rules(),
                Instant::now(),
            )
        });

        monitor.check_all().await;

        assert!(monitor.status("a").is_some());
        assert!(monitor.status("b").is_none());
    }

    #[tokio::test]
    async fn test_passive_client_error_keeps_backend_online() {
        let (monitor, _transport) = setup(&["a"]);
        let latency = Duration::from_millis(5);

        monitor.observe("a", Observation::from_call(Err(ErrorKind::Client), latency));
        let record = monitor
            .observe("a", Observation::from_call(Err(ErrorKind::Server), latency))
            .unwrap();

        assert_eq!(record.status, HealthStatus::Degraded);
        assert_eq!(record.consecutive_failures, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_deregister_racing_check_leaves_no_record() {
        let registry = Arc::new(ServiceRegistry::new());
        let transport = Arc::new(ScriptedTransport::new());
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&registry),
            transport.clone(),
            HealthConfig::default(),
        ));

        for round in 0..300 {
            registry.register(descriptor("a", Duration::from_secs(1)));
            let checker = Arc::clone(&monitor);
            let pending = tokio::spawn(async move { checker.check("a").await });
            for _ in 0..round % 5 {
                tokio::task::yield_now().await;
            }
            registry.deregister("a");
            let _ = pending.await.unwrap();

            assert!(monitor.status("a").is_none(), "record survived round {round}");
        }
    }

    #[tokio::test]
    async fn test_observe_unknown_service_is_dropped() {
        let (monitor, _transport) = setup(&[]);

        let record = monitor.observe("ghost", Observation::success(Duration::ZERO));

        assert!(record.is_none());
        assert!(monitor.status("ghost").is_none());
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let (monitor, transport) = setup(&["a"]);
        let monitor = Arc::new(monitor);
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(Arc::clone(&monitor).run(rx));
        time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor loop did not stop")
            .unwrap();
        assert_eq!(transport.health_calls("a"), 1);
    }
}
