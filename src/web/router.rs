//! Router configuration for the HTTP API.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{upload_document, AppState};

/// Legacy upload path used by older MinuTAG clients.
pub const LEGACY_UPLOAD_PATH: &str = "/minutag/upload-txt";

/// Create the upload router.
///
/// `max_body_bytes` only applies to these routes.
pub fn create_router(app_state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/upload-document", post(upload_document))
        .route(LEGACY_UPLOAD_PATH, post(upload_document))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Liveness only; no dependency checks.
async fn health_check() -> &'static str {
    "ok"
}
