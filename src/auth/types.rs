//! Authentication user types.

use crate::jwt::AccessClaims;

/// Authenticated user information extracted from the access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// JWT claims from the access token
    pub claims: AccessClaims,
}

impl AuthenticatedUser {
    /// Database user ID
    pub fn user_id(&self) -> i64 {
        self.claims.uid
    }

    pub fn username(&self) -> &str {
        &self.claims.sub
    }
}
