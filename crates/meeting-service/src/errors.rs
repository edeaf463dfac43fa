//! Meeting service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl.
//! Messages returned to clients are generic; the underlying cause is logged
//! server-side.
//!
//! # Token failures
//!
//! The cipher distinguishes a structurally malformed token from one that
//! fails authentication (see [`crate::crypto::TokenError`]). That distinction
//! is recorded in logs and metrics only. Both collapse into
//! [`MeetingError::InvalidToken`] before leaving the service layer, so a
//! caller cannot use responses as a token-validity oracle.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// PostgreSQL SQLSTATE for unique constraint violations.
const PG_UNIQUE_VIOLATION: &str = "23505";

/// Meeting service error type.
///
/// Maps to HTTP status codes:
/// - InvalidToken: 401 Unauthorized
/// - NotFound, Expired: 404 Not Found
/// - AlreadyExists: 409 Conflict
/// - NotAllowed: 403 Forbidden
/// - BadRequest: 400 Bad Request
/// - ServiceUnavailable: 503 Service Unavailable
/// - Database, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum MeetingError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Meeting not found")]
    NotFound,

    #[error("Meeting already exists")]
    AlreadyExists,

    #[error("Not allowed: {0}")]
    NotAllowed(String),

    #[error("Meeting expired")]
    Expired,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeetingError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            MeetingError::InvalidToken => 401,
            MeetingError::NotFound | MeetingError::Expired => 404,
            MeetingError::AlreadyExists => 409,
            MeetingError::NotAllowed(_) => 403,
            MeetingError::BadRequest(_) => 400,
            MeetingError::ServiceUnavailable(_) => 503,
            MeetingError::Database(_) | MeetingError::Internal(_) => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for MeetingError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            MeetingError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "The meeting token is invalid".to_string(),
            ),
            MeetingError::NotFound | MeetingError::Expired => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Meeting not found".to_string(),
            ),
            MeetingError::AlreadyExists => (
                StatusCode::CONFLICT,
                "ALREADY_EXISTS",
                "Meeting already exists".to_string(),
            ),
            MeetingError::NotAllowed(reason) => {
                (StatusCode::FORBIDDEN, "NOT_ALLOWED", reason.clone())
            }
            MeetingError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            MeetingError::Database(err) => {
                tracing::error!(target: "meeting.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            MeetingError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "meeting.errors", reason = %reason, "Collaborator unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "A dependent service is unavailable".to_string(),
                )
            }
            MeetingError::Internal(reason) => {
                tracing::error!(target: "meeting.errors", reason = %reason, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for MeetingError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION) {
                return MeetingError::AlreadyExists;
            }
        }
        MeetingError::Database(err.to_string())
    }
}
