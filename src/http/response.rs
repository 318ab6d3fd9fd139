//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn dispatch results and fan-out reports into HTTP responses
//! - Map every error kind to one status code and a JSON error body
//!
//! # Design Decisions
//! - A backend's own 4xx status is passed through; the gateway does not
//!   second-guess the backend's verdict on the request
//! - Backend timeouts result in 504 Gateway Timeout
//! - JSON payloads are embedded as JSON in fan-out reports, anything else
//!   as lossy UTF-8

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::dispatch::{DispatchOutcome, DispatchResult};
use crate::error::{ErrorKind, GatewayError};
use crate::fanout::{EntryStatus, FanoutReport};
use crate::transport::Payload;

pub const X_SERVED_BY: &str = "x-served-by";
pub const X_ATTEMPTS: &str = "x-attempts";

/// HTTP status for a failure kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::NoCandidates | ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Client => StatusCode::BAD_REQUEST,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Connection | ErrorKind::Server | ErrorKind::AllFailed => StatusCode::BAD_GATEWAY,
    }
}

fn error_body(kind: ErrorKind, message: String) -> Value {
    json!({ "error": kind, "message": message })
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        let mut body = error_body(kind, self.to_string());
        if let GatewayError::AllFailed(report) = &self {
            body["report"] = report_json(report);
        }
        (status, Json(body)).into_response()
    }
}

/// Response for a single-target or failover dispatch.
pub fn dispatch_response(result: DispatchResult) -> Response {
    let served_by = HeaderValue::from_str(&result.service_id).ok();
    let attempts = HeaderValue::from(result.attempts);

    let mut response = match result.outcome {
        DispatchOutcome::Success(payload) => payload_response(payload),
        DispatchOutcome::Failure { kind, status } => {
            let status = status
                .filter(|_| kind == ErrorKind::Client)
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or_else(|| status_for(kind));
            let message = if result.service_id.is_empty() {
                "no dispatch target".to_string()
            } else {
                format!("dispatch to '{}' failed: {kind}", result.service_id)
            };
            (status, Json(error_body(kind, message))).into_response()
        }
    };

    let headers = response.headers_mut();
    if let Some(value) = served_by {
        headers.insert(X_SERVED_BY, value);
    }
    headers.insert(X_ATTEMPTS, attempts);
    response
}

fn payload_response(payload: Payload) -> Response {
    let status = StatusCode::from_u16(payload.status).unwrap_or(StatusCode::OK);
    let mut response = (status, payload.body).into_response();
    let content_type = payload
        .content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok());
    match content_type {
        Some(value) => {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        None => {
            response.headers_mut().remove(header::CONTENT_TYPE);
        }
    }
    response
}

fn payload_json(payload: &Payload) -> Value {
    serde_json::from_slice(&payload.body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&payload.body).into_owned()))
}

/// JSON view of a fan-out report.
pub fn report_json(report: &FanoutReport) -> Value {
    let entries: Vec<Value> = report
        .entries
        .iter()
        .map(|entry| {
            let mut value = json!({
                "service_id": entry.service_id,
                "status": entry.status.label(),
                "latency_ms": entry.latency.as_millis() as u64,
                "attempts": entry.attempts,
            });
            match &entry.status {
                EntryStatus::Succeeded(payload) => {
                    value["http_status"] = json!(payload.status);
                    value["payload"] = payload_json(payload);
                }
                EntryStatus::Failed(kind) => {
                    value["error"] = json!(kind);
                }
                EntryStatus::TimedOut => {}
            }
            value
        })
        .collect();

    json!({
        "capability": report.capability,
        "elapsed_ms": report.elapsed.as_millis() as u64,
        "succeeded": report.success_count(),
        "failed": report.failed_count(),
        "timed_out": report.timed_out_count(),
        "entries": entries,
    })
}

pub fn report_response(report: &FanoutReport) -> Response {
    (StatusCode::OK, Json(report_json(report))).into_response()
}
