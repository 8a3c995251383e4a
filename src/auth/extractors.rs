//! Axum extractors for authentication.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthErrorKind> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthErrorKind::MissingToken)?
        .to_str()
        .map_err(|_| AuthErrorKind::MalformedHeader)?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AuthErrorKind::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthErrorKind::MalformedHeader);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthErrorKind::MalformedHeader);
    }
    Ok(token)
}

/// Verify the bearer access token on a request.
/// Stateless: no database lookup, so a deleted user stays authorised until
/// the token expires.
pub fn authenticate_request<S>(
    headers: &HeaderMap,
    state: &S,
) -> Result<AuthenticatedUser, AuthErrorKind>
where
    S: HasAuthBackend,
{
    let token = bearer_token(headers)?;

    let claims = state.jwt().validate_access_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        AuthErrorKind::InvalidToken
    })?;

    Ok(AuthenticatedUser { claims })
}

/// Extractor for endpoints that require a valid access token.
/// The decoded identity is also stored in the request extensions.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(Auth(user.clone()));
        }

        let user = authenticate_request(&parts.headers, state)?;
        parts.extensions.insert(user.clone());
        Ok(Auth(user))
    }
}

/// Middleware guarding a whole router: rejects requests without a valid
/// access token and attaches the identity for the `Auth` extractor.
pub async fn require_auth<S>(
    State(state): State<S>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiAuthError>
where
    S: HasAuthBackend + Clone + Send + Sync + 'static,
{
    let user = authenticate_request(request.headers(), &state)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
