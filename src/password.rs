//! Password hashing and verification using Argon2id.
//!
//! Hashing is CPU and memory heavy, so every call runs on the blocking pool
//! and never stalls the async workers serving other connections.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Errors from hashing or verifying passwords.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Invalid Argon2 parameters: {0}")]
    InvalidParams(String),
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),
    #[error("Invalid password hash format")]
    InvalidHashFormat,
    #[error("Hashing task failed: {0}")]
    TaskFailed(String),
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Number of iterations
    pub time_cost: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    /// OWASP minimum for Argon2id: 19 MiB, 2 iterations, 1 lane.
    fn default() -> Self {
        Self {
            memory_cost: 19 * 1024,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl PasswordConfig {
    fn argon2(&self) -> Result<Argon2<'static>, PasswordError> {
        let params = Params::new(self.memory_cost, self.time_cost, self.parallelism, None)
            .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Hashes and verifies passwords off the async runtime.
pub struct Passwords {
    config: PasswordConfig,
    dummy_hash: OnceCell<Arc<str>>,
}

impl Passwords {
    pub fn new(config: PasswordConfig) -> Self {
        Self {
            config,
            dummy_hash: OnceCell::new(),
        }
    }

    /// Hash a password into a PHC string (algorithm, parameters and salt included).
    pub async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let argon2 = self.config.argon2()?;
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| PasswordError::HashingFailed(e.to_string()))
        })
        .await
        .map_err(|e| PasswordError::TaskFailed(e.to_string()))?
    }

    /// Check a password against a stored hash. Parameters are read from the hash.
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let password = password.to_owned();
        let hash = hash.to_owned();

        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash).map_err(|_| PasswordError::InvalidHashFormat)?;
            Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| PasswordError::TaskFailed(e.to_string()))?
    }

    /// Spend the same work as a real verification when the user does not exist.
    pub async fn verify_absent(&self, password: &str) -> Result<(), PasswordError> {
        let dummy = self
            .dummy_hash
            .get_or_try_init(|| async {
                self.hash("jobtrack-dummy-password").await.map(Arc::from)
            })
            .await?
            .clone();
        self.verify(password, &dummy).await.map(|_| ())
    }
}
