//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) unless the caller sent one
//! - Split gateway control headers from the headers forwarded to backends
//! - Build the [`GatewayRequest`] handed to the dispatcher
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Control headers (`x-failover`, `x-respect-health`, `x-deadline-ms`)
//!   are consumed here and never forwarded
//! - Bodies are buffered once; retries and fan-out reuse the same bytes

use std::time::Duration;

use axum::http::{header::HeaderName, HeaderMap, HeaderValue, Method, Request, Uri};
use bytes::Bytes;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::dispatch::Target;
use crate::transport::GatewayRequest;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_FAILOVER: &str = "x-failover";
pub const X_RESPECT_HEALTH: &str = "x-respect-health";
pub const X_DEADLINE_MS: &str = "x-deadline-ms";

const CONTROL_HEADERS: [&str; 3] = [X_FAILOVER, X_RESPECT_HEALTH, X_DEADLINE_MS];

/// Largest inbound body the gateway buffers.
pub const MAX_REQUEST_BODY: usize = 4 * 1024 * 1024;

/// UUID v4 request ids for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeUuidRequestId;

impl MakeRequestId for MakeUuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Access to the request id assigned by the request-id layer.
pub trait RequestIdExt {
    fn request_id(&self) -> &str;
}

impl RequestIdExt for HeaderMap {
    fn request_id(&self) -> &str {
        self.get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }
}

/// Dispatch target named by the path id plus any `x-failover` ids.
pub fn target_from(id: &str, headers: &HeaderMap) -> Target {
    let extra: Vec<String> = headers
        .get(X_FAILOVER)
        .and_then(|v| v.to_str().ok())
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != id)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if extra.is_empty() {
        Target::single(id)
    } else {
        Target::chain(std::iter::once(id.to_string()).chain(extra))
    }
}

/// `x-respect-health` override; unparseable values are ignored.
pub fn respect_health_from(headers: &HeaderMap) -> Option<bool> {
    headers
        .get(X_RESPECT_HEALTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<bool>().ok())
}

/// `x-deadline-ms` override; zero and unparseable values are ignored.
pub fn deadline_from(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(X_DEADLINE_MS)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

/// Backend path: the wildcard remainder plus the original query string.
pub fn forward_path(rest: Option<&str>, uri: &Uri) -> String {
    let mut path = format!("/{}", rest.unwrap_or("").trim_start_matches('/'));
    if let Some(query) = uri.query() {
        path.push('?');
        path.push_str(query);
    }
    path
}

/// Build the request forwarded to backends.
pub fn build_forward(method: Method, path: String, mut headers: HeaderMap, body: Bytes) -> GatewayRequest {
    for name in CONTROL_HEADERS {
        headers.remove(HeaderName::from_static(name));
    }
    let mut request = GatewayRequest::new(method, path).with_body(body);
    request.headers = headers;
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_target_from_failover_header() {
        let target = target_from("a", &headers(&[(X_FAILOVER, "b, c,,a")]));
        assert_eq!(target, Target::chain(["a", "b", "c"]));

        assert_eq!(target_from("a", &HeaderMap::new()), Target::single("a"));
    }

    #[test]
    fn test_overrides() {
        let map = headers(&[(X_RESPECT_HEALTH, "true"), (X_DEADLINE_MS, "250")]);
        assert_eq!(respect_health_from(&map), Some(true));
        assert_eq!(deadline_from(&map), Some(Duration::from_millis(250)));

        let map = headers(&[(X_RESPECT_HEALTH, "maybe"), (X_DEADLINE_MS, "0")]);
        assert_eq!(respect_health_from(&map), None);
        assert_eq!(deadline_from(&map), None);
    }

    #[test]
    fn test_forward_path_keeps_query() {
        let uri: Uri = "/services/a/search/v1?q=rust".parse().unwrap();
        assert_eq!(forward_path(Some("search/v1"), &uri), "/search/v1?q=rust");

        let uri: Uri = "/services/a".parse().unwrap();
        assert_eq!(forward_path(None, &uri), "/");
    }

    #[test]
    fn test_control_headers_are_not_forwarded() {
        let map = headers(&[(X_FAILOVER, "b"), ("x-client-id", "alice")]);
        let body = Bytes::from_static(b"{\"q\":\"rust\"}");
        let request = build_forward(Method::POST, "/search".into(), map, body.clone());

        assert!(request.headers.get(X_FAILOVER).is_none());
        assert_eq!(request.headers.get("x-client-id").unwrap(), "alice");
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/search");
        assert_eq!(request.body, body);
    }

    #[test]
    fn test_request_ids_are_uuids() {
        let request = Request::new(());
        let id = MakeUuidRequestId.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(value).is_ok());
    }
}
