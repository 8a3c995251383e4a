pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod client;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;

use api::{SessionSettings, create_api_router};
use axum::Router;
use db::Database;
use jwt::{JwtConfig, TokenDurations};
use password::{PasswordConfig, Passwords};
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens, distinct from the access secret
    pub refresh_secret: Vec<u8>,
    /// Access and refresh token lifetimes
    pub durations: TokenDurations,
    /// Argon2 cost parameters for password hashing
    pub password: PasswordConfig,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Take the client IP from X-Forwarded-For (requires running behind a proxy)
    pub trust_forwarded_for: bool,
    /// Per-IP limit for login and registration attempts
    pub rate_limit_per_minute: u32,
    /// Seconds a rotated refresh token is still accepted (concurrent refreshes)
    pub reuse_grace_secs: u64,
    /// Path attribute of the refresh cookie, the public path of `/refresh`
    pub cookie_path: String,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::with_durations(
        &config.access_secret,
        &config.refresh_secret,
        config.durations,
    ));
    let passwords = Arc::new(Passwords::new(config.password));
    let rate_limit = Arc::new(RateLimitConfig::new(
        config.rate_limit_per_minute,
        config.trust_forwarded_for,
    ));

    create_api_router(
        config.db.clone(),
        jwt,
        passwords,
        SessionSettings {
            secure_cookies: config.secure_cookies,
            cookie_path: config.cookie_path.clone(),
            reuse_grace_secs: config.reuse_grace_secs,
            trust_forwarded_for: config.trust_forwarded_for,
        },
        rate_limit,
    )
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub fn init_cleanup(db: &Database) -> tokio::task::JoinHandle<()> {
    cleanup::spawn_cleanup_scheduler(db.clone())
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config.db);

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
