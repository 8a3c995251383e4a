//! Refresh token storage for rotation and revocation.
//!
//! Only refresh tokens are stored. Access tokens are stateless and
//! short-lived. Each stored row is single use: refreshing marks it consumed
//! and records its replacement. Consumed rows are kept until they expire.

use sqlx::sqlite::SqlitePool;

const COLUMNS: &str = "id, jti, user_id, last_ip, issued_at, expires_at, consumed_at, replaced_by";

/// SQLite integers are signed; refuse timestamps that would wrap.
fn to_sql(secs: u64) -> Result<i64, sqlx::Error> {
    i64::try_from(secs).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// A refresh token record. Timestamps are Unix seconds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredToken {
    pub id: i64,
    pub jti: String,
    pub user_id: i64,
    pub last_ip: Option<String>,
    pub issued_at: i64,
    pub expires_at: i64,
    /// Set once the token has been exchanged
    pub consumed_at: Option<i64>,
    /// JTI of the token issued in exchange
    pub replaced_by: Option<String>,
}

impl StoredToken {
    /// Whether the token was consumed less than `grace_secs` before `now`.
    pub fn consumed_within(&self, now: u64, grace_secs: u64) -> bool {
        self.consumed_at
            .and_then(|at| u64::try_from(at).ok())
            .is_some_and(|at| now.saturating_sub(at) < grace_secs)
    }
}

/// Store for managing refresh tokens.
pub struct TokenStore {
    pool: SqlitePool,
}

impl TokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a newly issued refresh token.
    pub async fn create(
        &self,
        jti: &str,
        user_id: i64,
        ip: Option<&str>,
        issued_at: u64,
        expires_at: u64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO refresh_tokens (jti, user_id, last_ip, issued_at, expires_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(jti)
        .bind(user_id)
        .bind(ip)
        .bind(to_sql(issued_at)?)
        .bind(to_sql(expires_at)?)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get a token by its JWT ID, consumed or not.
    pub async fn get_by_jti(&self, jti: &str) -> Result<Option<StoredToken>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM refresh_tokens WHERE jti = ?"
        ))
        .bind(jti)
        .fetch_optional(&self.pool)
        .await
    }

    /// Atomically mark a user's unconsumed token as consumed and return it.
    /// Of two concurrent callers presenting the same JTI, only one gets `Some`.
    pub async fn consume(
        &self,
        jti: &str,
        user_id: i64,
        now: u64,
    ) -> Result<Option<StoredToken>, sqlx::Error> {
        sqlx::query_as(&format!(
            "UPDATE refresh_tokens SET consumed_at = ? \
             WHERE jti = ? AND user_id = ? AND consumed_at IS NULL \
             RETURNING {COLUMNS}"
        ))
        .bind(to_sql(now)?)
        .bind(jti)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Link a consumed token to the token issued in its place.
    pub async fn set_replaced_by(&self, jti: &str, replaced_by: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE refresh_tokens SET replaced_by = ? WHERE jti = ?")
            .bind(replaced_by)
            .bind(jti)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a token by its JWT ID (revoke).
    pub async fn delete_by_jti(&self, jti: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE jti = ?")
            .bind(jti)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all tokens that expired before `now`.
    pub async fn delete_expired(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ?")
            .bind(to_sql(now)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete all tokens for a user (logout everywhere).
    pub async fn delete_all_by_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
