use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use pingpong_common::error::PingpongError;
use pingpong_metrics::{
    Decoded, IngestReport, InputFormat,
    format::{self, exposition},
};
use tracing::info;

use super::{ApiError, status_for};
use crate::router::ApiState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IngestKind {
    Create,
    Update,
}

pub async fn create_metrics(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let decoded = decode_request(&headers, &body)?;
    let report = state.registry.create(&decoded.families);
    info!(
        families = decoded.families.len(),
        recorded = report.recorded(),
        "create request handled"
    );

    Ok(ingest_response(IngestKind::Create, decoded.errors, report))
}

pub async fn update_metrics(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let decoded = decode_request(&headers, &body)?;
    let report = state.registry.update(&decoded.families);
    info!(
        families = decoded.families.len(),
        recorded = report.recorded(),
        "update request handled"
    );

    Ok(ingest_response(IngestKind::Update, decoded.errors, report))
}

fn decode_request(headers: &HeaderMap, body: &[u8]) -> Result<Decoded, PingpongError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .ok_or(PingpongError::MissingContentType)?
        .to_str()
        .map_err(|_| PingpongError::UnsupportedMediaType("non-ascii content type".to_string()))?;

    format::decode(InputFormat::from_content_type(content_type)?, body)
}

/// Recorded lines first, then one `# error:` comment per rejected item, so
/// the body stays valid exposition text.
fn ingest_response(
    kind: IngestKind,
    decode_errors: Vec<PingpongError>,
    report: IngestReport,
) -> Response {
    let recorded = report.recorded();
    let mut errors = decode_errors;
    errors.extend(report.errors);

    let mut body = String::new();
    for family in &report.families {
        if kind == IngestKind::Create {
            body.push_str("# created ");
            body.push_str(&family.name);
            body.push('\n');
        }
        for line in &family.lines {
            body.push_str(line);
        }
        if kind == IngestKind::Create {
            body.push('\n');
        }
    }

    for error in &errors {
        body.push_str("# error: ");
        body.push_str(&error.to_string().replace('\n', " "));
        body.push('\n');
    }

    let status = match errors.first() {
        Some(first) if recorded == 0 => status_for(first),
        _ => StatusCode::OK,
    };

    let mut response = (status, body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(exposition::CONTENT_TYPE),
    );
    response
}
