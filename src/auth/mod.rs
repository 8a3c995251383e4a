//! Bearer-token authentication.
//!
//! Dual-token system: short-lived access tokens travel in the
//! `Authorization` header and are verified statelessly; long-lived refresh
//! tokens travel only in an HTTP-only cookie scoped to the refresh path and are
//! tracked in the database.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{
    REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH, clear_refresh_cookie, get_cookie, refresh_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{Auth, authenticate_request, bearer_token, require_auth};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
