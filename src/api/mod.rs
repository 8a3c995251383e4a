mod error;
mod jobs;
mod register;
mod session;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::password::Passwords;
use crate::rate_limit::RateLimitConfig;

pub use error::{ApiError, ResultExt};
pub use jobs::JobsState;
pub use register::{Credentials, RegisterState};
pub use session::{DEFAULT_REUSE_GRACE_SECS, SessionSettings, SessionState, TokenResponse};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    passwords: Arc<Passwords>,
    settings: SessionSettings,
    rate_limit: Arc<RateLimitConfig>,
) -> Router {
    let register_state = RegisterState {
        db: db.clone(),
        passwords: passwords.clone(),
    };

    let session_state = SessionState {
        db: db.clone(),
        jwt: jwt.clone(),
        passwords,
        settings: Arc::new(settings),
    };

    let jobs_state = JobsState { db, jwt };

    Router::new()
        .merge(register::router(register_state, rate_limit.clone()))
        .merge(session::router(session_state, rate_limit))
        .merge(jobs::router(jobs_state))
}
