//! API Error Types
//!
//! Defines error types for the HTTP layer (including rejected WebSocket
//! handshakes) and implements conversion to responses with status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or invalid credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable (dependency down, capacity reached)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Forbidden(_) => ApiError::Forbidden(err.to_string()),
            AuthError::IdentityTimeout | AuthError::IdentityService(_) => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            AuthError::Internal(_) => ApiError::Internal(err.to_string()),
            _ => ApiError::Unauthorized(err.to_string()),
        }
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        };

        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "API error occurred"
            );
        } else {
            tracing::debug!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
