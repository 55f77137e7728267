/// Unified error types for the EcoNeT portal
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the portal core
#[derive(Error, Debug)]
pub enum PortalError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The machine-wide insertion slot is held by another session
    #[error("Machine is currently busy")]
    Busy,

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not legal in the session's current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert PortalError to HTTP response
impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            PortalError::Busy => (
                StatusCode::CONFLICT,
                "MachineBusy",
                "Another user is inserting bottles. Please try again in a few minutes."
                    .to_string(),
            ),
            PortalError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            PortalError::InvalidState(_) => {
                (StatusCode::CONFLICT, "InvalidState", self.to_string())
            }
            PortalError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string())
            }
            PortalError::Database(_) | PortalError::Io(_) | PortalError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// True when the underlying database error is a unique-constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

/// Result type alias for portal operations
pub type PortalResult<T> = Result<T, PortalError>;
