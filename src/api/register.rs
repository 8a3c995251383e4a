//! Account registration.
//!
//! - POST `/register` - Create an account (does not sign in)

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt};
use crate::db::{CreateUserError, Database, normalize_username};
use crate::password::Passwords;
use crate::rate_limit::{RateLimitConfig, rate_limit_register};

#[derive(Clone)]
pub struct RegisterState {
    pub db: Database,
    pub passwords: Arc<Passwords>,
}

pub fn router(state: RegisterState, rate_limit: Arc<RateLimitConfig>) -> Router {
    Router::new()
        .route("/register", post(register))
        .with_state(state)
        .layer(middleware::from_fn_with_state(rate_limit, rate_limit_register))
}

/// Username and password as submitted by the sign-in and sign-up forms.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub user: String,
    pub pwd: String,
}

impl Credentials {
    /// Normalised username, or `MissingField` if either value is empty.
    pub fn validated_username(&self) -> Result<String, ApiError> {
        let username = normalize_username(&self.user);
        if username.is_empty() || self.pwd.is_empty() {
            return Err(ApiError::missing_field(
                "Username and password are required.",
            ));
        }
        Ok(username)
    }
}

#[derive(Serialize)]
struct RegisterResponse {
    success: String,
}

fn username_taken() -> ApiError {
    ApiError::conflict("Username is already taken")
}

async fn register(
    State(state): State<RegisterState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let username = payload.validated_username()?;

    // Checked up front so a taken name costs no hashing work
    let existing = state
        .db
        .users()
        .find_by_username(&username)
        .await
        .db_err("Failed to look up user")?;
    if existing.is_some() {
        return Err(username_taken());
    }

    let hash = state
        .passwords
        .hash(&payload.pwd)
        .await
        .internal_err("Failed to hash password")?;

    let user = match state.db.users().create(&username, &hash).await {
        Ok(user) => user,
        Err(CreateUserError::Conflict) => return Err(username_taken()),
        Err(CreateUserError::Database(e)) => {
            return Err(ApiError::internal("Failed to create user", e));
        }
    };

    info!(user_id = user.id, username = %user.username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: format!("New user {} created!", user.username),
        }),
    ))
}
