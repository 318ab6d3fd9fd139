//! Concurrent capability fan-out under a shared deadline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio::time;

use crate::dispatch::{Dispatcher, Target};
use crate::error::{ErrorKind, GatewayError, GatewayResult};
use crate::fanout::report::{EntryStatus, FanoutEntry, FanoutReport};
use crate::observability::metrics;
use crate::registry::ServiceRegistry;
use crate::resilience::DispatchPolicy;
use crate::transport::GatewayRequest;

pub struct FanoutAggregator {
    registry: Arc<ServiceRegistry>,
    dispatcher: Arc<Dispatcher>,
}

impl FanoutAggregator {
    pub fn new(registry: Arc<ServiceRegistry>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            registry,
            dispatcher,
        }
    }

    /// Call every backend advertising `capability` and gather what arrives
    /// before `deadline`.
    ///
    /// Fails only when nothing advertises the capability or when no
    /// candidate succeeded; the all-failed error carries the full report.
    pub async fn fanout(
        &self,
        capability: &str,
        request: GatewayRequest,
        deadline: Duration,
        policy: DispatchPolicy,
    ) -> GatewayResult<FanoutReport> {
        let candidates = self.registry.by_capability(capability);
        if candidates.is_empty() {
            metrics::record_fanout("no_candidates", 0, 0);
            return Err(GatewayError::NoCandidates(capability.to_string()));
        }

        let started = Instant::now();
        let deadline_at = time::Instant::now() + deadline;
        let request = Arc::new(request);

        let mut pending: HashSet<String> = HashSet::with_capacity(candidates.len());
        let mut tasks = JoinSet::new();
        for service in &candidates {
            pending.insert(service.id.clone());
            let dispatcher = Arc::clone(&self.dispatcher);
            let request = Arc::clone(&request);
            let target = Target::single(service.id.clone());
            tasks.spawn(async move { dispatcher.call(&target, &request, policy).await });
        }

        let mut entries = Vec::with_capacity(candidates.len());
        let mut deadline_fired = false;
        loop {
            match time::timeout_at(deadline_at, tasks.join_next()).await {
                Ok(Some(Ok(result))) => {
                    pending.remove(&result.service_id);
                    entries.push(FanoutEntry::from(result));
                }
                Ok(Some(Err(e))) => {
                    tracing::error!(capability = %capability, error = %e, "Fan-out task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_fired = true;
                    break;
                }
            }
        }

        // Abandoned calls keep running to their own timeouts so their
        // health observations still land.
        tasks.detach_all();

        let cutoff = started.elapsed();
        for service_id in pending {
            let entry = if deadline_fired {
                FanoutEntry::timed_out(service_id, cutoff)
            } else {
                FanoutEntry {
                    service_id,
                    latency: cutoff,
                    attempts: 0,
                    status: EntryStatus::Failed(ErrorKind::Unavailable),
                }
            };
            entries.push(entry);
        }

        let report = FanoutReport::new(capability, entries, started.elapsed());
        let timed_out = report.timed_out_count();
        tracing::debug!(
            capability = %capability,
            candidates = report.entries.len(),
            succeeded = report.success_count(),
            timed_out,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Fan-out complete"
        );

        if report.success_count() == 0 {
            metrics::record_fanout("all_failed", report.entries.len(), timed_out);
            return Err(GatewayError::AllFailed(Box::new(report)));
        }
        let label = if report.success_count() == report.entries.len() {
            "complete"
        } else {
            "partial"
        };
        metrics::record_fanout(label, report.entries.len(), timed_out);
        Ok(report)
    }
}
