//! The dispatcher: retries, backoff and failover for one logical call.

use std::sync::Arc;
use std::time::Instant;

use tokio::time;

use crate::dispatch::{DispatchOutcome, DispatchResult, Target};
use crate::error::ErrorKind;
use crate::health::{HealthMonitor, Observation};
use crate::observability::metrics;
use crate::registry::{ServiceDescriptor, ServiceRegistry};
use crate::resilience::timeouts::with_timeout;
use crate::resilience::DispatchPolicy;
use crate::transport::{CallFailure, GatewayRequest, Transport};

/// How the attempts against one target ended.
enum Hop {
    /// Success or a non-retryable failure; the call is over.
    Final(DispatchOutcome),
    /// Retries exhausted on a retryable failure; try the next target.
    Exhausted(CallFailure),
}

pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
    health: Arc<HealthMonitor>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        health: Arc<HealthMonitor>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            registry,
            health,
            transport,
        }
    }

    /// Send `request` to `target` under `policy`.
    pub async fn call(
        &self,
        target: &Target,
        request: &GatewayRequest,
        policy: DispatchPolicy,
    ) -> DispatchResult {
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut last: Option<(String, DispatchOutcome)> = None;
        let mut skipped: Option<&str> = None;

        for id in target.ids() {
            let service = match self.registry.lookup(id) {
                Ok(service) => service,
                Err(_) => {
                    tracing::warn!(service = %id, "Dispatch target is not registered");
                    last = Some((id.clone(), DispatchOutcome::failure(ErrorKind::NotFound)));
                    continue;
                }
            };

            if policy.respect_health && self.is_offline(id).await {
                tracing::debug!(service = %id, "Skipping offline target");
                skipped = Some(id.as_str());
                continue;
            }

            match self.attempt_target(&service, request, &policy, &mut attempts).await {
                Hop::Final(outcome) => {
                    return self.finish(id.clone(), outcome, started, attempts);
                }
                Hop::Exhausted(failure) => {
                    tracing::warn!(
                        service = %id,
                        error = %failure.kind,
                        "Retries exhausted, advancing failover chain"
                    );
                    let outcome = DispatchOutcome::Failure {
                        kind: failure.kind,
                        status: failure.status,
                    };
                    last = Some((id.clone(), outcome));
                }
            }
        }

        let (service_id, outcome) = match (last, skipped) {
            (Some(last), _) => last,
            (None, Some(id)) => (id.to_string(), DispatchOutcome::failure(ErrorKind::Unavailable)),
            (None, None) => (String::new(), DispatchOutcome::failure(ErrorKind::NoCandidates)),
        };
        self.finish(service_id, outcome, started, attempts)
    }

    /// Health verdict through the cache; an expired record is re-checked
    /// first, so a recovered backend is not skipped on stale evidence.
    async fn is_offline(&self, id: &str) -> bool {
        match self.health.get_cached(id).await {
            Ok(record) => record.is_offline(),
            Err(_) => false,
        }
    }

    async fn attempt_target(
        &self,
        service: &ServiceDescriptor,
        request: &GatewayRequest,
        policy: &DispatchPolicy,
        attempts: &mut u32,
    ) -> Hop {
        let mut last = CallFailure::new(ErrorKind::Connection);

        for attempt in 0..policy.attempts_per_target() {
            *attempts += 1;
            let begun = Instant::now();
            let result = with_timeout(
                service.declared_timeout,
                self.transport.send(service, request),
            )
            .await;
            let latency = begun.elapsed();

            let observed = result.as_ref().map(|_| ()).map_err(|failure| failure.kind);
            self.health
                .observe(&service.id, Observation::from_call(observed, latency));

            match result {
                Ok(payload) => return Hop::Final(DispatchOutcome::Success(payload)),
                Err(failure) if !failure.kind.is_retryable() => {
                    return Hop::Final(DispatchOutcome::Failure {
                        kind: failure.kind,
                        status: failure.status,
                    });
                }
                Err(failure) => {
                    let delay = policy.backoff(attempt);
                    tracing::info!(
                        service = %service.id,
                        attempt = attempt + 1,
                        error = %failure.kind,
                        delay = ?delay,
                        "Retryable failure, backing off"
                    );
                    time::sleep(delay).await;
                    last = failure;
                }
            }
        }

        Hop::Exhausted(last)
    }

    fn finish(
        &self,
        service_id: String,
        outcome: DispatchOutcome,
        started: Instant,
        attempts: u32,
    ) -> DispatchResult {
        let latency = started.elapsed();
        let label = match &outcome {
            DispatchOutcome::Success(_) => "success",
            DispatchOutcome::Failure { kind, .. } => kind.as_str(),
        };
        metrics::record_dispatch(label, attempts, latency);
        tracing::debug!(
            service = %service_id,
            outcome = label,
            attempts,
            latency_ms = latency.as_millis() as u64,
            "Dispatch finished"
        );

        DispatchResult {
            service_id,
            outcome,
            latency,
            attempts,
        }
    }
}
