//! Admin API: read-only views over the registry, health and metadata.

pub mod handlers;

use axum::{routing::get, Router};

use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router() -> Router<AppState> {
    Router::new()
        .route("/admin/services", get(get_services))
        .route("/admin/summary", get(get_summary))
        .route("/admin/services/{id}/metadata", get(get_metadata))
}
