// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (state-machine rejections)
    NotRunnable(String),
    InvalidTransition(String),
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::NotRunnable(_) => 409,
            ApiError::InvalidTransition(_) => 409,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::NotRunnable(msg) => msg,
            ApiError::InvalidTransition(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::NotRunnable(_) => "OPERATION_NOT_RUNNABLE",
            ApiError::InvalidTransition(_) => "INVALID_TRANSITION",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        ApiError::ValidationError(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }
}

// Convert domain error types to ApiError
impl From<crate::operations::registry::OperationError> for ApiError {
    fn from(err: crate::operations::registry::OperationError) -> Self {
        use crate::operations::registry::OperationError;
        match err {
            OperationError::Validation(msg) => ApiError::ValidationError(msg),
            OperationError::NotFound(id) => {
                ApiError::not_found(format!("Operation not found: {}", id))
            }
            err @ OperationError::NotRunnable { .. } => ApiError::NotRunnable(err.to_string()),
            err @ OperationError::InvalidTransition { .. } => {
                ApiError::InvalidTransition(err.to_string())
            }
        }
    }
}

impl From<crate::rollback::coordinator::RollbackError> for ApiError {
    fn from(err: crate::rollback::coordinator::RollbackError) -> Self {
        match err {
            crate::rollback::coordinator::RollbackError::AlreadyInFlight(_) => {
                ApiError::NotRunnable(err.to_string())
            }
        }
    }
}

impl From<crate::store::StoreError> for ApiError {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::SourceNotFound(_)
            | crate::store::StoreError::VersionNotFound { .. } => {
                ApiError::not_found(err.to_string())
            }
            crate::store::StoreError::Io(msg) => {
                tracing::error!("Versioned store I/O error: {}", msg);
                ApiError::internal_server_error("Versioned store error occurred")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
