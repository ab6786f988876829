use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::download::error::ProbeError;
use crate::download::formats::{FormatDescriptor, SELECTION_POLICY};

/// Centralized error type for the service.
///
/// Every handler returns `AppResult`; the `IntoResponse` impl below is the only
/// place where errors become HTTP payloads.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed input, rejected before any subprocess is spawned
    #[error("Validation error: {0}")]
    Validation(String),

    /// Metadata probe failed (non-zero exit or unparseable output)
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// No audio-only format met the quality bar
    #[error("No suitable audio format among {} candidates", formats.len())]
    NoSuitableFormat { formats: Vec<FormatDescriptor> },

    /// Extract/encode/transcode/bundle job failed
    #[error("Job failed: {message}")]
    Job { message: String, stderr: String },

    /// Session context could not be resolved or created
    #[error("Session error: {0}")]
    Session(String),

    /// Unknown playlist item, expired download token, vanished file
    #[error("Not found: {0}")]
    NotFound(String),

    /// A required external tool is missing
    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Url(_) => StatusCode::BAD_REQUEST,
            AppError::Probe(_) | AppError::NoSuitableFormat { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ToolUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Job { .. }
            | AppError::Session(_)
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable error code used in JSON payloads
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::Url(_) => "invalid_input",
            AppError::Probe(ProbeError::ParseFailed(_)) => "parse_failed",
            AppError::Probe(_) => "probe_failed",
            AppError::NoSuitableFormat { .. } => "no_suitable_format",
            AppError::Job { .. } => "job_failed",
            AppError::Session(_) => "session_failed",
            AppError::NotFound(_) => "not_found",
            AppError::ToolUnavailable(_) => "tool_unavailable",
            AppError::Io(_) | AppError::Json(_) | AppError::Anyhow(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        } else {
            log::warn!("Request rejected ({}): {}", status.as_u16(), self);
        }

        let body = match &self {
            AppError::Probe(err) => json!({
                "error": self.code(),
                "detail": err.detail(),
                "exitCode": err.exit_code(),
            }),
            AppError::NoSuitableFormat { formats } => json!({
                "error": self.code(),
                "detail": "No audio-only format reaches the required quality",
                "formats": formats,
                "chosen": null,
                "picker": SELECTION_POLICY,
            }),
            AppError::Job { message, stderr } => json!({
                "error": self.code(),
                "message": message,
                "stderr": stderr,
            }),
            AppError::Validation(detail) | AppError::NotFound(detail) | AppError::ToolUnavailable(detail) => json!({
                "error": self.code(),
                "detail": detail,
            }),
            other => json!({
                "error": other.code(),
                "message": other.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::NoSuitableFormat { formats: Vec::new() }.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Probe(ProbeError::ParseFailed("eof".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Job {
                message: "boom".into(),
                stderr: String::new()
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_parse_failure_has_distinct_code() {
        assert_eq!(AppError::Probe(ProbeError::ParseFailed("x".into())).code(), "parse_failed");
        assert_eq!(
            AppError::Probe(ProbeError::Failed {
                exit_code: Some(1),
                stderr: "ERROR".into()
            })
            .code(),
            "probe_failed"
        );
    }
}
