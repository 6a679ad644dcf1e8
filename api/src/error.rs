//! Error types for the Q-Gen HTTP boundary.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response}
};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced to HTTP clients.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or out-of-bounds inbound payload.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Client IP exceeded the request window.
    #[error("Rate limit exceeded. Try again in {retry_in_secs:.1} seconds.")]
    RateLimitExceeded { retry_in_secs: f64 },

    /// The model core could not serve the call.
    #[error("Upstream model error: {0}")]
    Upstream(String),

    /// Unexpected condition.
    #[error("Internal error: {0}")]
    Internal(String)
}

impl From<qgen_core::QgenError> for ApiError {
    fn from(err: qgen_core::QgenError) -> Self {
        match err {
            qgen_core::QgenError::Configuration { message } => Self::Internal(message),
            qgen_core::QgenError::ClientUnavailable => {
                Self::Upstream("model client unavailable after retries".to_string())
            }
        }
    }
}

/// Error response body for HTTP endpoints.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR"
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.error_code().to_string(),
            details: None
        };
        (status, Json(body)).into_response()
    }
}
