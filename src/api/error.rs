//! Shared error handling for API endpoints.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{debug, error};

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn db_err(self, msg: &str) -> Result<T, ApiError>;
    fn internal_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn db_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::internal(msg, e))
    }
    fn internal_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::internal(msg, e))
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    /// 400: a required field is empty or absent
    MissingField(String),
    /// 401: unknown user or wrong password, deliberately indistinguishable
    InvalidCredentials,
    /// 409: username already taken
    Conflict(String),
    /// 401: missing, expired or invalid token
    Unauthenticated(String),
    /// 500: a valid token names a user that no longer exists
    UserNotFound,
    /// 404
    NotFound(String),
    /// 429
    TooManyRequests(String),
    /// 500: details are logged, never returned
    Internal,
}

impl ApiError {
    pub fn missing_field(msg: impl Into<String>) -> Self {
        Self::MissingField(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Log an unexpected failure and hide it behind a generic 500.
    pub fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        error!(error = %e, "{}", context);
        Self::Internal
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingField(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials | ApiError::Unauthenticated(_) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::UserNotFound | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A body that is absent, not JSON, or the wrong shape lacks the fields
/// the handler needs.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(status = %rejection.status(), reason = %rejection.body_text(), "Rejected request body");
        Self::MissingField("Request body must be a JSON object with the required fields.".to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            ApiError::MissingField(msg)
            | ApiError::Conflict(msg)
            | ApiError::Unauthenticated(msg)
            | ApiError::NotFound(msg)
            | ApiError::TooManyRequests(msg) => msg,
            ApiError::InvalidCredentials => "Invalid username or password".to_string(),
            ApiError::UserNotFound | ApiError::Internal => "Internal server error".to_string(),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
