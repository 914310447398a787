use axum::{
    Router,
    routing::{get, post},
};

use crate::QuerierState;

pub mod metrics;
pub mod render;

/// Header carrying the tenant when the request does not name one
pub const TENANT_HEADER: &str = "x-tenant-id";

pub fn router<S: QuerierState>() -> Router<S> {
    Router::new()
        .route("/render", get(render::render::<S>).post(render::render::<S>))
        .route("/metrics", post(metrics::ingest::<S>))
        .route("/health", get(health))
}

/// GET /health
#[tracing::instrument]
pub async fn health() -> &'static str {
    "OK"
}
