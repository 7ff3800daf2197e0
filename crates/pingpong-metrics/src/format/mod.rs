//! Conversion between wire formats and [`MetricFamily`] lists.
//!
//! Every decoder produces the same canonical families; the registry never
//! sees which format a payload arrived in.

pub mod exposition;
pub mod json;
pub mod text;

use pingpong_common::error::{PingpongError, Result};

use crate::types::MetricFamily;

/// Families recovered from a payload, plus the per-sample problems that were
/// skipped along the way.
#[derive(Debug, Default)]
pub struct Decoded {
    pub families: Vec<MetricFamily>,
    pub errors: Vec<PingpongError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Json,
    Text,
}

impl InputFormat {
    /// Picks a decoder from a `Content-Type` value, ignoring parameters.
    pub fn from_content_type(content_type: &str) -> Result<Self> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match media_type.as_str() {
            "" => Err(PingpongError::MissingContentType),
            "application/json" => Ok(Self::Json),
            "application/x-www-form-urlencoded" | "text/plain" => Ok(Self::Text),
            _ => Err(PingpongError::UnsupportedMediaType(media_type)),
        }
    }
}

pub fn decode(format: InputFormat, body: &[u8]) -> Result<Decoded> {
    match format {
        InputFormat::Json => json::decode(body),
        InputFormat::Text => {
            let text = std::str::from_utf8(body).map_err(|err| {
                PingpongError::MalformedInput(format!("exposition text is not utf-8: {err}"))
            })?;
            text::decode(text)
        }
    }
}
