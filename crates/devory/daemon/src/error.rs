//! Error types for devoryd

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use devory_collab::AllocationError;
use devory_storage::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage backend could not be opened
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request carried no usable caller identity
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Allocator rejected the operation
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Allocation(err) => match err {
                AllocationError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                AllocationError::NotFound(_) => StatusCode::NOT_FOUND,
                AllocationError::Unauthorized(_) | AllocationError::SelfJoinForbidden(_) => {
                    StatusCode::FORBIDDEN
                }
                AllocationError::InvalidPostType(_) | AllocationError::InvalidInput(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                AllocationError::DuplicateRequest(_)
                | AllocationError::Closed(_)
                | AllocationError::Full(_)
                | AllocationError::InvalidState(_)
                | AllocationError::Conflict(_) => StatusCode::CONFLICT,
                AllocationError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
                AllocationError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::Allocation(err) => err.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let details = match &self {
            ApiError::Allocation(err) if err.is_retryable() => {
                Some(serde_json::json!({ "retryable": true }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
