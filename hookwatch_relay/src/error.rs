//! Relay error types and their HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Event feed origin is not configured")]
    ServiceUnavailable,

    #[error("Invalid session id: {0}")]
    InvalidSession(String),

    #[error("Origin responded with {status}: {message}")]
    UpstreamStatus { status: StatusCode, message: String },

    #[error("Failed to reach origin: {0}")]
    Upstream(#[from] reqwest::Error),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    pub status: u16,
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::InvalidSession(_) => StatusCode::BAD_REQUEST,
            RelayError::UpstreamStatus { status, .. } => *status,
            RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            RelayError::ServiceUnavailable => "service_unavailable",
            RelayError::InvalidSession(_) => "invalid_session",
            RelayError::UpstreamStatus { .. } => "upstream_status",
            RelayError::Upstream(_) => "upstream_unreachable",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.error_code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
