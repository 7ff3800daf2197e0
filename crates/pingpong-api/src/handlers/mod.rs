pub mod health;
pub mod ingest;
pub mod metrics;
pub mod ping;

use axum::{Json, http::StatusCode, response::IntoResponse};
use pingpong_common::error::PingpongError;

pub struct ApiError(pub PingpongError);

impl From<PingpongError> for ApiError {
    fn from(value: PingpongError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            status_for(&self.0),
            Json(serde_json::json!({
                "code": self.0.error_code(),
                "message": self.0.to_string(),
            })),
        )
            .into_response()
    }
}

pub fn status_for(error: &PingpongError) -> StatusCode {
    match error {
        PingpongError::InvalidIdentifier(_)
        | PingpongError::MalformedInput(_)
        | PingpongError::LabelSetMismatch { .. }
        | PingpongError::ValueParseError { .. }
        | PingpongError::MissingContentType => StatusCode::BAD_REQUEST,
        PingpongError::UnknownMetric(_) => StatusCode::NOT_FOUND,
        PingpongError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        PingpongError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
