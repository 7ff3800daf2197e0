use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use pingpong_metrics::format::{exposition, json};
use tracing::debug;

use super::ApiError;
use crate::router::ApiState;

pub async fn prometheus_metrics(
    State(state): State<Arc<ApiState>>,
) -> Result<Response, ApiError> {
    let snapshot = state.registry.snapshot()?;
    debug!(families = snapshot.len(), "serving exposition snapshot");

    Ok(with_content_type(
        exposition::encode(&snapshot),
        exposition::CONTENT_TYPE,
    ))
}

pub async fn json_metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    let snapshot = state.registry.snapshot()?;
    Ok(with_content_type(json::encode(&snapshot)?, "application/json"))
}

fn with_content_type(payload: String, content_type: &'static str) -> Response {
    let mut response = payload.into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
