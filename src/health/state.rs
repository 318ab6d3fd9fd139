//! Backend health state.
//!
//! # States
//! - Online: last observation succeeded
//! - Degraded: failing, but below the failure threshold
//! - Offline: consecutive failures reached the threshold
//!
//! # State Transitions
//! ```text
//! any     → Online:   one successful observation (failures reset to 0)
//! Online  → Degraded: a failure while failures + 1 < threshold
//! any     → Offline:  failures + 1 >= threshold
//! ```
//!
//! Records are immutable once built. Every write swaps a whole
//! `Arc<HealthRecord>` into the store under the entry's shard lock, so a
//! concurrent reader sees either the previous record or the next one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::error::ErrorKind;

/// Health status of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Online,
    Degraded,
    Offline,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Online => "online",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Offline => "offline",
        }
    }
}

/// Snapshot of one backend's health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthRecord {
    pub service_id: String,
    pub status: HealthStatus,
    pub last_checked_at: Instant,
    pub latency: Duration,
    pub cache_expires_at: Instant,
    pub consecutive_failures: u32,
    /// Kind of the most recent failure, cleared on success.
    pub last_error: Option<ErrorKind>,
}

impl HealthRecord {
    /// Whether the record is still within its TTL at `now`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.cache_expires_at
    }

    pub fn is_offline(&self) -> bool {
        self.status == HealthStatus::Offline
    }
}

/// Concurrent map of serviceId → latest health record.
#[derive(Debug, Default)]
pub struct HealthStore {
    records: DashMap<String, Arc<HealthRecord>>,
}

impl HealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record for a service, if it was ever observed.
    pub fn get(&self, service_id: &str) -> Option<Arc<HealthRecord>> {
        self.records.get(service_id).map(|r| Arc::clone(r.value()))
    }

    /// Replace the record for `service_id` with one derived from the previous.
    ///
    /// `next` runs under the entry lock, so two concurrent updates for the
    /// same service never lose each other's failure counts.
    pub fn update<F>(&self, service_id: &str, next: F) -> Arc<HealthRecord>
    where
        F: FnOnce(Option<&HealthRecord>) -> HealthRecord,
    {
        match self.records.entry(service_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let record = Arc::new(next(Some(entry.get().as_ref())));
                entry.insert(Arc::clone(&record));
                record
            }
            Entry::Vacant(entry) => {
                let record = Arc::new(next(None));
                entry.insert(Arc::clone(&record));
                record
            }
        }
    }

    pub fn remove(&self, service_id: &str) -> Option<Arc<HealthRecord>> {
        self.records.remove(service_id).map(|(_, record)| record)
    }

    /// Drop records whose service no longer exists.
    pub fn retain<F>(&self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.records.retain(|id, _| keep(id));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
