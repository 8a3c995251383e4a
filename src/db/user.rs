use sqlx::sqlite::SqlitePool;

/// Canonical form of a username: trimmed and lowercased.
/// " Alice", "alice" and "ALICE " all name the same account.
pub fn normalize_username(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

/// Failure to create a user.
#[derive(Debug, thiserror::Error)]
pub enum CreateUserError {
    #[error("username is already taken")]
    Conflict,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Find a user by username (normalised before lookup).
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT id, username, password_hash FROM users WHERE username = ?")
            .bind(normalize_username(username))
            .fetch_optional(&self.pool)
            .await
    }

    /// Create a user with an already hashed password.
    /// A username collision is reported as `Conflict`, not as a database error.
    pub async fn create(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<User, CreateUserError> {
        let username = normalize_username(username);

        let result = sqlx::query("INSERT INTO users (username, password_hash) VALUES (?, ?)")
            .bind(&username)
            .bind(password_hash)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => Ok(User {
                id: done.last_insert_rowid(),
                username,
                password_hash: password_hash.to_string(),
            }),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(CreateUserError::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a user by ID. Tokens and jobs cascade.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
