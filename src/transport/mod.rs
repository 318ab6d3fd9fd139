//! Outbound transport subsystem.
//!
//! # Data Flow
//! ```text
//! HealthMonitor ──probe──┐
//! MetadataCache ──fetch──┼──▶ Transport ──▶ backend (baseAddress + path)
//! Dispatcher ────send────┘
//! ```
//!
//! # Design Decisions
//! - Transports classify failures; callers never see raw client errors
//! - Timeouts are enforced by the caller with the descriptor's deadline
//! - Payloads are opaque bytes, never decoded on the dispatch path

pub mod http;
#[cfg(test)]
pub(crate) mod mock;

use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use futures_util::future::BoxFuture;

use crate::error::ErrorKind;
use crate::registry::ServiceDescriptor;

pub use self::http::HttpTransport;

/// A request to forward to one backend.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    /// Path and query appended to the backend's base address.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl GatewayRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// A successful backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl Payload {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }
}

/// A classified failed call, with the backend's status when it answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFailure {
    pub kind: ErrorKind,
    pub status: Option<u16>,
}

impl CallFailure {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, status: None }
    }

    /// Classify a non-success status: 4xx is the caller's fault, anything
    /// else is the backend's.
    pub fn from_status(status: StatusCode) -> Self {
        let kind = if status.is_client_error() {
            ErrorKind::Client
        } else {
            ErrorKind::Server
        };
        Self {
            kind,
            status: Some(status.as_u16()),
        }
    }
}

impl From<ErrorKind> for CallFailure {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Network seam between the gateway and its backends.
pub trait Transport: Send + Sync + 'static {
    /// Probe `path` on the backend; any non-2xx answer is a failure.
    fn probe<'a>(
        &'a self,
        service: &'a ServiceDescriptor,
        path: &'a str,
    ) -> BoxFuture<'a, Result<(), ErrorKind>>;

    /// Forward one request to the backend.
    fn send<'a>(
        &'a self,
        service: &'a ServiceDescriptor,
        request: &'a GatewayRequest,
    ) -> BoxFuture<'a, Result<Payload, CallFailure>>;

    /// Fetch and decode a JSON document from the backend.
    fn fetch_json<'a>(
        &'a self,
        service: &'a ServiceDescriptor,
        path: &'a str,
    ) -> BoxFuture<'a, Result<serde_json::Value, ErrorKind>>;
}
