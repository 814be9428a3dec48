//! HTTP error mapping for leadflow-intake
//!
//! Handlers return [`ApiResult`]; this is the only place status codes are chosen.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::IngestError;
use crate::validation::FormValidationError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or wrong access token (403)
    #[error("Access denied")]
    Forbidden,

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// leadflow-common error
    #[error("Common error: {0}")]
    Common(#[from] leadflow_common::Error),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<FormValidationError> for ApiError {
    fn from(err: FormValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", "Access denied".to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, message = %message, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
