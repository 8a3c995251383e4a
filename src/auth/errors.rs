//! Authentication error types.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Why a bearer credential was rejected. Every kind maps to 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No Authorization header
    MissingToken,
    /// Authorization header is not `Bearer <token>`
    MalformedHeader,
    /// Bad signature, wrong token type, or expired
    InvalidToken,
}

/// API authentication error (JSON body, `WWW-Authenticate: Bearer`).
#[derive(Debug)]
pub struct ApiAuthError(pub(super) AuthErrorKind);

impl ApiAuthError {
    fn message(&self) -> &'static str {
        match self.0 {
            AuthErrorKind::MissingToken => "Not authenticated",
            AuthErrorKind::MalformedHeader => "Malformed authorization header",
            AuthErrorKind::InvalidToken => "Invalid or expired token",
        }
    }
}

impl From<AuthErrorKind> for ApiAuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self(kind)
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}
