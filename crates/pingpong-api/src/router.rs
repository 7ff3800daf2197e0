use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use pingpong_metrics::MetricsRegistry;
use tower_http::trace::TraceLayer;

use crate::handlers;

pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

pub struct ApiState {
    pub registry: Arc<MetricsRegistry>,
}

impl ApiState {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }
}

pub fn api_router(state: Arc<ApiState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/create", post(handlers::ingest::create_metrics))
        .route("/update", post(handlers::ingest::update_metrics))
        .route("/metrics", get(handlers::metrics::prometheus_metrics))
        .route("/metrics.json", get(handlers::metrics::json_metrics))
        .route("/ping", get(handlers::ping::ping))
        .route("/time", get(handlers::ping::current_time))
        .route("/health/live", get(handlers::health::health_live))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
