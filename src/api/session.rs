//! Session endpoints.
//!
//! - POST `/auth` - Verify credentials, return an access token and set the refresh cookie
//! - GET `/refresh` - Exchange the refresh cookie for a new access token (rotates the cookie)
//! - DELETE `/refresh` - Revoke the refresh token and clear the cookie

use axum::{
    Json, Router,
    extract::{FromRequestParts, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::SET_COOKIE, request::Parts},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::{ApiError, ResultExt};
use super::register::Credentials;
use crate::auth::{
    REFRESH_COOKIE_NAME, clear_refresh_cookie, extract_client_ip, get_cookie, refresh_cookie,
};
use crate::db::Database;
use crate::jwt::{JwtConfig, unix_now};
use crate::password::Passwords;
use crate::rate_limit::{RateLimitConfig, rate_limit_login};

/// Default window in which a rotated refresh token is still honoured.
pub const DEFAULT_REUSE_GRACE_SECS: u64 = 30;

/// Cookie and rotation settings for the session endpoints.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub secure_cookies: bool,
    /// Path attribute of the refresh cookie
    pub cookie_path: String,
    /// A consumed refresh token presented again within this many seconds is
    /// treated as a concurrent refresh, not as theft
    pub reuse_grace_secs: u64,
    pub trust_forwarded_for: bool,
}

#[derive(Clone)]
pub struct SessionState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub passwords: Arc<Passwords>,
    pub settings: Arc<SessionSettings>,
}

impl SessionState {
    fn clear_cookie(&self) -> String {
        clear_refresh_cookie(&self.settings.cookie_path, self.settings.secure_cookies)
    }
}

pub fn router(state: SessionState, rate_limit: Arc<RateLimitConfig>) -> Router {
    let login_router = Router::new()
        .route("/auth", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(rate_limit, rate_limit_login));

    Router::new()
        .route("/refresh", get(refresh).delete(logout))
        .with_state(state)
        .merge(login_router)
}

/// Body of a successful login or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub user: String,
}

/// Client IP for token bookkeeping. Absent if it cannot be determined.
struct ClientIp(Option<String>);

impl FromRequestParts<SessionState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SessionState,
    ) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(
            extract_client_ip(parts, state.settings.trust_forwarded_for).ok(),
        ))
    }
}

/// A freshly minted token pair, ready to send.
struct IssuedSession {
    /// Set-Cookie value carrying the refresh token
    cookie: String,
    body: TokenResponse,
    /// JTI of the new refresh token
    jti: String,
}

impl IntoResponse for IssuedSession {
    fn into_response(self) -> Response {
        (StatusCode::OK, [(SET_COOKIE, self.cookie)], Json(self.body)).into_response()
    }
}

/// Mint an access token and a tracked refresh token for a user.
async fn issue_session(
    state: &SessionState,
    user_id: i64,
    username: &str,
    ip: Option<&str>,
) -> Result<IssuedSession, ApiError> {
    let access = state
        .jwt
        .generate_access_token(user_id, username)
        .internal_err("Failed to generate access token")?;

    let refresh = state
        .jwt
        .generate_refresh_token(username)
        .internal_err("Failed to generate refresh token")?;

    state
        .db
        .tokens()
        .create(
            &refresh.jti,
            user_id,
            ip,
            refresh.issued_at,
            refresh.expires_at,
        )
        .await
        .db_err("Failed to store refresh token")?;

    let cookie = refresh_cookie(
        &refresh.token,
        refresh.duration,
        &state.settings.cookie_path,
        state.settings.secure_cookies,
    );

    Ok(IssuedSession {
        cookie,
        body: TokenResponse {
            access_token: access.token,
            user: username.to_string(),
        },
        jti: refresh.jti,
    })
}

async fn login(
    State(state): State<SessionState>,
    ClientIp(ip): ClientIp,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let username = payload.validated_username()?;

    let user = state
        .db
        .users()
        .find_by_username(&username)
        .await
        .db_err("Failed to look up user")?;

    let Some(user) = user else {
        // Same cost as a wrong password, so timing does not reveal which names exist
        state
            .passwords
            .verify_absent(&payload.pwd)
            .await
            .internal_err("Failed to verify password")?;
        debug!(username = %username, "Login for unknown user");
        return Err(ApiError::InvalidCredentials);
    };

    let valid = state
        .passwords
        .verify(&payload.pwd, &user.password_hash)
        .await
        .internal_err("Failed to verify password")?;
    if !valid {
        debug!(user_id = user.id, "Login with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let issued = issue_session(&state, user.id, &user.username, ip.as_deref()).await?;
    info!(user_id = user.id, "User logged in");

    Ok(issued)
}

/// Validate the refresh cookie, consume it and issue a replacement pair.
///
/// A token that was already consumed is honoured again only within the
/// grace window, where it is the loser of two concurrent refreshes sharing
/// one cookie. Outside the window, or if the token is no longer on record,
/// it is treated as stolen and every session of the user is revoked.
async fn rotate(
    state: &SessionState,
    headers: &HeaderMap,
    ip: Option<&str>,
) -> Result<IssuedSession, ApiError> {
    let token = get_cookie(headers, REFRESH_COOKIE_NAME)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthenticated("No refresh token"))?;

    let claims = state.jwt.validate_refresh_token(token).map_err(|e| {
        debug!(error = %e, "Rejected refresh token");
        ApiError::unauthenticated("Invalid or expired refresh token")
    })?;

    let user = state
        .db
        .users()
        .find_by_username(&claims.sub)
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(|| {
            error!(username = %claims.sub, "Valid refresh token for a missing user");
            ApiError::UserNotFound
        })?;

    let now = unix_now().internal_err("Failed to read system time")?;
    let tokens = state.db.tokens();

    let consumed = tokens
        .consume(&claims.jti, user.id, now)
        .await
        .db_err("Failed to consume refresh token")?;

    if consumed.is_some() {
        let issued = issue_session(state, user.id, &user.username, ip).await?;
        tokens
            .set_replaced_by(&claims.jti, &issued.jti)
            .await
            .db_err("Failed to link refresh tokens")?;
        return Ok(issued);
    }

    let grace = state.settings.reuse_grace_secs;
    let recent = tokens
        .get_by_jti(&claims.jti)
        .await
        .db_err("Failed to look up refresh token")?
        .filter(|t| t.user_id == user.id && t.consumed_within(now, grace));

    if let Some(previous) = recent {
        debug!(
            user_id = user.id,
            replaced_by = previous.replaced_by.as_deref().unwrap_or("-"),
            "Concurrent refresh with a just rotated token"
        );
        return issue_session(state, user.id, &user.username, ip).await;
    }

    let revoked = tokens
        .delete_all_by_user(user.id)
        .await
        .db_err("Failed to revoke refresh tokens")?;
    warn!(user_id = user.id, revoked, "Refresh token reuse, revoked all sessions");
    Err(ApiError::unauthenticated("Refresh token has been revoked"))
}

async fn refresh(
    State(state): State<SessionState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
) -> Response {
    match rotate(&state, &headers, ip.as_deref()).await {
        Ok(issued) => issued.into_response(),
        Err(e @ ApiError::Unauthenticated(_)) => {
            ([(SET_COOKIE, state.clear_cookie())], e).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Always succeeds: an absent or invalid cookie means there is nothing to revoke.
async fn logout(State(state): State<SessionState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = get_cookie(&headers, REFRESH_COOKIE_NAME) {
        if let Ok(claims) = state.jwt.validate_refresh_token(token) {
            match state.db.tokens().delete_by_jti(&claims.jti).await {
                Ok(true) => info!(username = %claims.sub, "User logged out"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Failed to revoke refresh token on logout"),
            }
        }
    }

    (StatusCode::NO_CONTENT, [(SET_COOKIE, state.clear_cookie())])
}
