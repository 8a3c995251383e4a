mod jobs;
mod token;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use jobs::{Job, JobFields, JobStore};
pub use token::{StoredToken, TokenStore};
pub use user::{CreateUserError, User, UserStore, normalize_username};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                // Refresh tokens (timestamps in Unix seconds). Consumed rows stay
                // until expiry so a replayed token can be recognised.
                "CREATE TABLE refresh_tokens (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    jti TEXT UNIQUE NOT NULL,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    last_ip TEXT,
                    issued_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    consumed_at INTEGER,
                    replaced_by TEXT
                )",
                "CREATE INDEX idx_refresh_tokens_user_id ON refresh_tokens(user_id)",
                "CREATE INDEX idx_refresh_tokens_expires_at ON refresh_tokens(expires_at)",
                // Job applications. List fields are stored comma separated.
                "CREATE TABLE jobs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    company TEXT NOT NULL,
                    location TEXT NOT NULL DEFAULT '',
                    link TEXT NOT NULL DEFAULT '',
                    remote INTEGER NOT NULL DEFAULT 0,
                    application TEXT NOT NULL DEFAULT '',
                    assessment TEXT NOT NULL DEFAULT '',
                    interview TEXT NOT NULL DEFAULT '',
                    rejection TEXT NOT NULL DEFAULT '',
                    notes TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_jobs_user_id ON jobs(user_id)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the refresh token store.
    pub fn tokens(&self) -> TokenStore {
        TokenStore::new(self.pool.clone())
    }

    /// Get the job store.
    pub fn jobs(&self) -> JobStore {
        JobStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_find_user() {
        let db = Database::open(":memory:").await.unwrap();

        let created = db.users().create("alice", "hash-1").await.unwrap();
        assert_eq!(created.username, "alice");

        let user = db.users().find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(user.id, created.id);
        assert_eq!(user.password_hash, "hash-1");
    }

    #[tokio::test]
    async fn test_lookup_is_case_and_whitespace_insensitive() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create(" Alice ", "hash").await.unwrap();

        for name in ["alice", "ALICE", "  alice", "aLiCe  "] {
            let user = db.users().find_by_username(name).await.unwrap();
            assert_eq!(user.map(|u| u.username).as_deref(), Some("alice"));
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create("alice", "hash-1").await.unwrap();

        for name in ["alice", "ALICE ", " alice"] {
            let result = db.users().create(name, "hash-2").await;
            assert!(matches!(result, Err(CreateUserError::Conflict)));
        }
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let db = Database::open(":memory:").await.unwrap();
        assert!(db.users().find_by_username("bob").await.unwrap().is_none());
        assert!(db.users().find_by_username("   ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reopen_does_not_rerun_migrations() {
        let dir = std::env::temp_dir().join(format!("jobtrack-{}.db", uuid::Uuid::new_v4()));
        let path = dir.to_string_lossy().to_string();

        let db = Database::open(&path).await.unwrap();
        db.users().create("alice", "hash").await.unwrap();
        db.pool().close().await;

        let db = Database::open(&path).await.unwrap();
        assert!(db.users().find_by_username("alice").await.unwrap().is_some());
        db.pool().close().await;

        let _ = std::fs::remove_file(&dir);
    }
}
