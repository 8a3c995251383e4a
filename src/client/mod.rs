//! Async client for the session protocol.
//!
//! The access token is kept in memory by [`SessionStore`]; the refresh
//! token is a cookie handled by the [`Transport`]. On start the client
//! silently refreshes, and each protected request is renewed and retried at
//! most once when its token is rejected.

mod auth_client;
mod error;
mod session;
mod transport;

pub use auth_client::{AuthClient, StartupOutcome};
pub use error::ClientError;
pub use session::{Session, SessionSnapshot, SessionStore};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport, TransportError};
