//! Rate limiting for credential endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password guessing.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::api::ApiError;
use crate::auth::extract_client_ip;

/// Requests per minute per IP when not configured otherwise.
pub const DEFAULT_PER_MINUTE: u32 = 10;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for credential endpoints.
pub struct RateLimitConfig {
    /// Per-IP limiter for `POST /auth`
    pub login: IpLimiter,
    /// Per-IP limiter for `POST /register`
    pub register: IpLimiter,
    trust_forwarded_for: bool,
}

impl RateLimitConfig {
    /// A zero limit is raised to one request per minute.
    pub fn new(per_minute: u32, trust_forwarded_for: bool) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            login: RateLimiter::keyed(quota),
            register: RateLimiter::keyed(quota),
            trust_forwarded_for,
        }
    }
}

async fn check(
    limiter: &IpLimiter,
    trust_forwarded_for: bool,
    message: &str,
    request: Request,
    next: Next,
) -> Response {
    let ip = match extract_client_ip(&request, trust_forwarded_for) {
        Ok(ip) => ip,
        Err(_) => {
            return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
        }
    };

    match limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(ip = %ip, "Rate limit exceeded");
            ApiError::TooManyRequests(message.to_string()).into_response()
        }
    }
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config.login,
        config.trust_forwarded_for,
        "Too many login attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting account creation.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config.register,
        config.trust_forwarded_for,
        "Too many signup attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_is_per_ip() {
        let config = RateLimitConfig::new(2, true);
        let a = "10.0.0.1".to_string();
        let b = "10.0.0.2".to_string();

        assert!(config.login.check_key(&a).is_ok());
        assert!(config.login.check_key(&a).is_ok());
        assert!(config.login.check_key(&a).is_err());
        assert!(config.login.check_key(&b).is_ok());

        // Separate buckets per endpoint
        assert!(config.register.check_key(&a).is_ok());
    }

    #[test]
    fn test_zero_limit_still_allows_one() {
        let config = RateLimitConfig::new(0, true);
        let ip = "10.0.0.1".to_string();
        assert!(config.login.check_key(&ip).is_ok());
        assert!(config.login.check_key(&ip).is_err());
    }
}
