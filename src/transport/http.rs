//! HTTP/1.1 transport over the hyper-util legacy client.

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Request};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::error::ErrorKind;
use crate::registry::ServiceDescriptor;
use crate::transport::{CallFailure, GatewayRequest, Payload, Transport};

const USER_AGENT: &str = concat!("agent-gateway/", env!("CARGO_PKG_VERSION"));

/// Upper bound on buffered backend response bodies.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Headers that describe a single hop and must not be forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_forwardable(name: &HeaderName) -> bool {
    *name != header::HOST
        && *name != header::CONTENT_LENGTH
        && !HOP_BY_HOP.contains(&name.as_str())
}

/// Transport that talks plain HTTP to every backend.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Body>,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }

    fn get_request(uri: String) -> Result<Request<Body>, ErrorKind> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::USER_AGENT, USER_AGENT)
            .body(Body::empty())
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to build backend request");
                ErrorKind::Client
            })
    }

    async fn execute(
        &self,
        service: &ServiceDescriptor,
        request: Request<Body>,
    ) -> Result<hyper::Response<Incoming>, ErrorKind> {
        self.client.request(request).await.map_err(|e| {
            tracing::debug!(service = %service.id, error = %e, "Backend connection failed");
            ErrorKind::Connection
        })
    }

    async fn get_ok(&self, service: &ServiceDescriptor, path: &str) -> Result<Body, ErrorKind> {
        let request = Self::get_request(service.endpoint(path))?;
        let response = self.execute(service, request).await?;
        if !response.status().is_success() {
            tracing::debug!(service = %service.id, status = %response.status(), "Backend answered non-success");
            return Err(CallFailure::from_status(response.status()).kind);
        }
        Ok(Body::new(response.into_body()))
    }

    async fn forward(
        &self,
        service: &ServiceDescriptor,
        request: &GatewayRequest,
    ) -> Result<Payload, CallFailure> {
        let mut builder = Request::builder()
            .method(request.method.clone())
            .uri(service.endpoint(&request.path));

        if let Some(headers) = builder.headers_mut() {
            for (name, value) in request.headers.iter() {
                if is_forwardable(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
            headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        }

        let outbound = builder
            .body(Body::from(request.body.clone()))
            .map_err(|e| {
                tracing::warn!(service = %service.id, error = %e, "Rejected malformed request");
                CallFailure::new(ErrorKind::Client)
            })?;

        let response = self
            .execute(service, outbound)
            .await
            .map_err(CallFailure::new)?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(CallFailure::from_status(status));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_BODY_BYTES)
            .await
            .map_err(|e| {
                tracing::debug!(service = %service.id, error = %e, "Backend body read failed");
                CallFailure::new(ErrorKind::Connection)
            })?;

        Ok(Payload {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn probe<'a>(
        &'a self,
        service: &'a ServiceDescriptor,
        path: &'a str,
    ) -> BoxFuture<'a, Result<(), ErrorKind>> {
        async move { self.get_ok(service, path).await.map(|_| ()) }.boxed()
    }

    fn send<'a>(
        &'a self,
        service: &'a ServiceDescriptor,
        request: &'a GatewayRequest,
    ) -> BoxFuture<'a, Result<Payload, CallFailure>> {
        self.forward(service, request).boxed()
    }

    fn fetch_json<'a>(
        &'a self,
        service: &'a ServiceDescriptor,
        path: &'a str,
    ) -> BoxFuture<'a, Result<serde_json::Value, ErrorKind>> {
        async move {
            let body = self.get_ok(service, path).await?;
            let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
                .await
                .map_err(|_| ErrorKind::Connection)?;
            serde_json::from_slice(&bytes).map_err(|e| {
                tracing::warn!(service = %service.id, error = %e, "Backend metadata is not JSON");
                ErrorKind::Server
            })
        }
        .boxed()
    }
}
