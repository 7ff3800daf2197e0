use thiserror::Error;

#[derive(Debug, Error)]
pub enum PingpongError {
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("label set mismatch for {metric}: expected [{expected}], got [{actual}]")]
    LabelSetMismatch {
        metric: String,
        expected: String,
        actual: String,
    },
    #[error("unknown metric: {0}")]
    UnknownMetric(String),
    #[error("invalid value for {metric}: {value:?}")]
    ValueParseError { metric: String, value: String },
    #[error("content-type header required")]
    MissingContentType,
    #[error("unsupported content type: {0}")]
    UnsupportedMediaType(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl PingpongError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier(_) => "InvalidIdentifier",
            Self::MalformedInput(_) => "MalformedInput",
            Self::LabelSetMismatch { .. } => "LabelSetMismatch",
            Self::UnknownMetric(_) => "UnknownMetric",
            Self::ValueParseError { .. } => "ValueParseError",
            Self::MissingContentType => "MissingContentType",
            Self::UnsupportedMediaType(_) => "UnsupportedMediaType",
            Self::InternalError(_) => "InternalError",
        }
    }
}

pub type Result<T> = std::result::Result<T, PingpongError>;
