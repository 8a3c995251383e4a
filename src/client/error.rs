use reqwest::StatusCode;
use serde::Deserialize;

use super::transport::{ApiResponse, TransportError};

/// Failures observed by the client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// 400, or rejected locally before sending
    #[error("{0}")]
    MissingField(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    Conflict(String),

    /// No session, or it could not be renewed
    #[error("Not signed in")]
    Unauthenticated,

    #[error("{0}")]
    NotFound(String),

    /// The request never got an answer (network down or server down)
    #[error("No response from server: {0}")]
    NoResponse(String),

    /// Any other non-success status, including 5xx
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// A success response whose body could not be decoded
    #[error("Unexpected response: {0}")]
    Decode(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl ClientError {
    /// Classify a non-success response by status code.
    pub fn from_response(response: &ApiResponse) -> Self {
        let message = serde_json::from_slice::<ErrorBody>(&response.body)
            .map(|b| b.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned());

        match response.status {
            StatusCode::BAD_REQUEST => ClientError::MissingField(message),
            StatusCode::UNAUTHORIZED => ClientError::Unauthenticated,
            StatusCode::NOT_FOUND => ClientError::NotFound(message),
            StatusCode::CONFLICT => ClientError::Conflict(message),
            status => ClientError::Server {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Infrastructure failure as opposed to an answer about the request itself.
    pub fn is_unavailable(&self) -> bool {
        match self {
            ClientError::NoResponse(_) => true,
            ClientError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        ClientError::NoResponse(e.0)
    }
}
