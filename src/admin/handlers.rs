use std::time::Instant;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::ErrorKind;
use crate::health::{HealthRecord, HealthStatus, HealthSummary};
use crate::http::server::AppState;
use crate::registry::ServiceDescriptor;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub services: usize,
}

#[derive(Serialize)]
pub struct HealthView {
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub latency_ms: u64,
    pub checked_ms_ago: u64,
    pub fresh: bool,
    pub last_error: Option<ErrorKind>,
}

impl HealthView {
    fn from_record(record: &HealthRecord, now: Instant) -> Self {
        Self {
            status: record.status,
            consecutive_failures: record.consecutive_failures,
            latency_ms: record.latency.as_millis() as u64,
            checked_ms_ago: now.saturating_duration_since(record.last_checked_at).as_millis() as u64,
            fresh: record.is_fresh(now),
            last_error: record.last_error,
        }
    }
}

#[derive(Serialize)]
pub struct ServiceStatus {
    pub id: String,
    pub base_address: String,
    pub capabilities: Vec<String>,
    pub timeout_ms: u64,
    /// `None` until the service has been observed.
    pub health: Option<HealthView>,
}

impl ServiceStatus {
    fn new(descriptor: &ServiceDescriptor, record: Option<&HealthRecord>, now: Instant) -> Self {
        Self {
            id: descriptor.id.clone(),
            base_address: descriptor.base_address.to_string(),
            capabilities: descriptor.capabilities.iter().cloned().collect(),
            timeout_ms: descriptor.declared_timeout.as_millis() as u64,
            health: record.map(|r| HealthView::from_record(r, now)),
        }
    }
}

/// Liveness of the gateway itself.
pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "ok",
        services: state.gateway.registry().len(),
    })
}

pub async fn get_services(State(state): State<AppState>) -> Json<Vec<ServiceStatus>> {
    let now = Instant::now();
    let health = state.gateway.health();
    let statuses = state
        .gateway
        .registry()
        .all()
        .iter()
        .map(|descriptor| {
            let record = health.status(&descriptor.id);
            ServiceStatus::new(descriptor, record.as_deref(), now)
        })
        .collect();
    Json(statuses)
}

/// Probe every service now and report the counts.
pub async fn get_summary(State(state): State<AppState>) -> Json<HealthSummary> {
    Json(state.gateway.health().check_all().await)
}

pub async fn get_metadata(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.gateway.metadata().get(&id).await {
        Ok(document) => Json(document.as_ref().clone()).into_response(),
        Err(e) => e.into_response(),
    }
}
