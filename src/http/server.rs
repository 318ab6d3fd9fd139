//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout, rate limit, metrics)
//! - Dispatch `/services/...` to one backend or a failover chain
//! - Fan `/capabilities/...` out to every backend with the capability
//! - Serve until the shutdown broadcast fires

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{MatchedPath, Path, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::{handlers::get_status, setup_admin_router};
use crate::gateway::Gateway;
use crate::http::request::{
    build_forward, deadline_from, forward_path, respect_health_from, target_from,
    MakeUuidRequestId, RequestIdExt, MAX_REQUEST_BODY,
};
use crate::http::response::{dispatch_response, report_response};
use crate::observability::metrics;
use crate::security::rate_limit_middleware;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

/// HTTP front end of the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(gateway: Arc<Gateway>, request_timeout: Duration) -> Self {
        let router = Self::build_router(gateway, request_timeout);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(gateway: Arc<Gateway>, request_timeout: Duration) -> Router {
        let limiter = Arc::clone(gateway.limiter());
        let state = AppState { gateway };

        Router::new()
            .route("/healthz", get(get_status))
            .route("/services/{id}", any(service_handler))
            .route("/services/{id}/{*path}", any(service_handler))
            .route("/capabilities/{capability}", any(capability_handler))
            .route("/capabilities/{capability}/{*path}", any(capability_handler))
            .merge(setup_admin_router())
            .route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
            .route_layer(middleware::from_fn(track_metrics))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeUuidRequestId))
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics::record_request(&method, response.status().as_u16(), &route, start);
    response
}

async fn read_body(body: Body) -> Result<bytes::Bytes, Response> {
    axum::body::to_bytes(body, MAX_REQUEST_BODY)
        .await
        .map_err(|_| (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response())
}

/// Single-target dispatch, optionally extended into a failover chain.
async fn service_handler(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let Some(id) = params.get("id") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let body = match read_body(body).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    let target = target_from(id, &parts.headers);
    let respect_health = respect_health_from(&parts.headers);
    let path = forward_path(params.get("path").map(String::as_str), &parts.uri);

    tracing::debug!(
        request_id = %parts.headers.request_id(),
        target = ?target.ids(),
        path = %path,
        "Dispatching request"
    );

    let forward = build_forward(parts.method, path, parts.headers, body);
    let result = state.gateway.dispatch(&target, &forward, respect_health).await;
    dispatch_response(result)
}

/// Fan-out to every backend advertising the capability.
async fn capability_handler(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let Some(capability) = params.get("capability") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let body = match read_body(body).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    let deadline = deadline_from(&parts.headers);
    let path = forward_path(params.get("path").map(String::as_str), &parts.uri);

    tracing::debug!(
        request_id = %parts.headers.request_id(),
        capability = %capability,
        path = %path,
        deadline = ?deadline,
        "Fanning out request"
    );

    let forward = build_forward(parts.method, path, parts.headers, body);
    match state.gateway.fanout(capability, forward, deadline).await {
        Ok(report) => report_response(&report),
        Err(e) => e.into_response(),
    }
}
