//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with separate secrets so that either
//! can be rotated without invalidating the other.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived bearer token, verified without a database lookup
    Access,
    /// Long-lived cookie token, tracked in the database with JTI
    Refresh,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (normalised username)
    pub sub: String,
    /// Database user ID, so protected handlers need no lookup
    pub uid: i64,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT claims for refresh tokens (tracked with JTI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// JWT ID (unique identifier for rotation and revocation)
    pub jti: String,
    /// Subject (normalised username)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Default access token duration: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Default refresh token duration: 1 day
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 24 * 60 * 60;

/// Upper bound for either lifetime: 1 year
pub const MAX_TOKEN_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Token lifetimes in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenDurations {
    pub access_secs: u64,
    pub refresh_secs: u64,
}

impl TokenDurations {
    /// Both lifetimes must be non-zero and at most a year, and an access
    /// token must expire before the refresh token that renews it.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.access_secs == 0 || self.refresh_secs == 0 {
            return Err("token lifetimes must be greater than zero");
        }
        if self.access_secs > MAX_TOKEN_DURATION_SECS || self.refresh_secs > MAX_TOKEN_DURATION_SECS
        {
            return Err("token lifetimes must not exceed one year");
        }
        if self.access_secs >= self.refresh_secs {
            return Err("access token lifetime must be shorter than refresh token lifetime");
        }
        Ok(())
    }
}

impl Default for TokenDurations {
    fn default() -> Self {
        Self {
            access_secs: ACCESS_TOKEN_DURATION_SECS,
            refresh_secs: REFRESH_TOKEN_DURATION_SECS,
        }
    }
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    access: SigningKeys,
    refresh: SigningKeys,
    durations: TokenDurations,
}

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The JWT token string
    pub token: String,
    /// Token duration in seconds
    pub duration: u64,
}

/// Result of generating a refresh token (with JTI for tracking).
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    /// The JWT token string
    pub token: String,
    /// JWT ID (unique identifier for database tracking)
    pub jti: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Current Unix time in seconds.
pub fn unix_now() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

impl JwtConfig {
    /// Create a JWT configuration with default token lifetimes.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self::with_durations(access_secret, refresh_secret, TokenDurations::default())
    }

    pub fn with_durations(
        access_secret: &[u8],
        refresh_secret: &[u8],
        durations: TokenDurations,
    ) -> Self {
        Self {
            access: SigningKeys::from_secret(access_secret),
            refresh: SigningKeys::from_secret(refresh_secret),
            durations,
        }
    }

    pub fn durations(&self) -> TokenDurations {
        self.durations
    }

    /// Generate an access token for a user.
    pub fn generate_access_token(
        &self,
        user_id: i64,
        username: &str,
    ) -> Result<AccessTokenResult, JwtError> {
        self.generate_access_token_at(user_id, username, unix_now()?)
    }

    /// Generate an access token as if issued at `now`.
    pub fn generate_access_token_at(
        &self,
        user_id: i64,
        username: &str,
        now: u64,
    ) -> Result<AccessTokenResult, JwtError> {
        let duration = self.durations.access_secs;
        let claims = AccessClaims {
            sub: username.to_string(),
            uid: user_id,
            token_type: TokenType::Access,
            iat: now,
            exp: now.checked_add(duration).ok_or(JwtError::ExpiryOverflow)?,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.access.encoding)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult { token, duration })
    }

    /// Generate a refresh token for a user.
    pub fn generate_refresh_token(&self, username: &str) -> Result<RefreshTokenResult, JwtError> {
        self.generate_refresh_token_at(username, unix_now()?)
    }

    /// Generate a refresh token as if issued at `now`.
    pub fn generate_refresh_token_at(
        &self,
        username: &str,
        now: u64,
    ) -> Result<RefreshTokenResult, JwtError> {
        let jti = uuid::Uuid::new_v4().to_string();
        let duration = self.durations.refresh_secs;
        let exp = now.checked_add(duration).ok_or(JwtError::ExpiryOverflow)?;

        let claims = RefreshClaims {
            jti: jti.clone(),
            sub: username.to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.refresh.encoding)
            .map_err(JwtError::Encoding)?;

        Ok(RefreshTokenResult {
            token,
            jti,
            issued_at: now,
            expires_at: exp,
            duration,
        })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let token_data =
            jsonwebtoken::decode::<AccessClaims>(token, &self.access.decoding, &strict())
                .map_err(JwtError::Decoding)?;

        if token_data.claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        let token_data =
            jsonwebtoken::decode::<RefreshClaims>(token, &self.refresh.decoding, &strict())
                .map_err(JwtError::Decoding)?;

        if token_data.claims.token_type != TokenType::Refresh {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }
}

fn strict() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token
    Decoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Issue time plus lifetime does not fit a timestamp
    ExpiryOverflow,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::ExpiryOverflow => write!(f, "Token expiry out of range"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
        }
    }
}

impl std::error::Error for JwtError {}
