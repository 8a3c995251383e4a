//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::api::DEFAULT_REUSE_GRACE_SECS;
use crate::auth::REFRESH_COOKIE_PATH;
use crate::db::Database;
use crate::jwt::{ACCESS_TOKEN_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS, TokenDurations};
use crate::password::PasswordConfig;
use crate::rate_limit::DEFAULT_PER_MINUTE;
use clap::Parser;
use tracing::{error, info, warn};

const MIN_SECRET_LENGTH: usize = 32;

pub const ACCESS_SECRET_ENV: &str = "ACCESS_TOKEN_SECRET";
pub const REFRESH_SECRET_ENV: &str = "REFRESH_TOKEN_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "jobtrack", about = "Job application tracker API server")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3500")]
    pub port: u16,

    /// Path to SQLite database file (":memory:" for a throwaway database)
    #[arg(short, long, default_value = "jobtrack.db")]
    pub database: String,

    /// Path to file containing the access token secret. Prefer ACCESS_TOKEN_SECRET instead
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer REFRESH_TOKEN_SECRET instead
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, default_value_t = ACCESS_TOKEN_DURATION_SECS)]
    pub access_ttl: u64,

    /// Refresh token (and cookie) lifetime in seconds
    #[arg(long, default_value_t = REFRESH_TOKEN_DURATION_SECS)]
    pub refresh_ttl: u64,

    /// Seconds during which an already rotated refresh token is still honoured,
    /// so two tabs refreshing at once do not trip reuse detection. 0 disables
    #[arg(long, default_value_t = DEFAULT_REUSE_GRACE_SECS)]
    pub reuse_grace: u64,

    /// Path attribute of the refresh cookie. Set to the public refresh URL path
    /// when a proxy serves the API under a prefix (e.g. /api/refresh)
    #[arg(long, default_value = REFRESH_COOKIE_PATH)]
    pub cookie_path: String,

    /// Omit the Secure cookie attribute. Only for plain-HTTP local development
    #[arg(long)]
    pub insecure_cookies: bool,

    /// Take the client IP from X-Forwarded-For. Only behind a proxy that sets it
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Login and signup attempts allowed per client IP per minute
    #[arg(long, default_value_t = DEFAULT_PER_MINUTE)]
    pub rate_limit: u32,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a signing secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            "{} is required. Set the environment variable (recommended) or use the matching --*-secret-file option",
            env_var
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            env_var, MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load both signing secrets. They must differ so each can be rotated alone.
pub fn load_secrets(args: &Args) -> Option<(String, String)> {
    let access = load_secret(ACCESS_SECRET_ENV, args.access_secret_file.as_deref())?;
    let refresh = load_secret(REFRESH_SECRET_ENV, args.refresh_secret_file.as_deref())?;

    if access == refresh {
        error!(
            "{} and {} must be different",
            ACCESS_SECRET_ENV, REFRESH_SECRET_ENV
        );
        return None;
    }

    Some((access, refresh))
}

/// Build ServerConfig from arguments.
/// Returns None and logs an error if a lifetime or the cookie path is unusable.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: String,
    refresh_secret: String,
) -> Option<ServerConfig> {
    let durations = TokenDurations {
        access_secs: args.access_ttl,
        refresh_secs: args.refresh_ttl,
    };
    if let Err(reason) = durations.validate() {
        error!(
            access_ttl = args.access_ttl,
            refresh_ttl = args.refresh_ttl,
            "Invalid token lifetimes: {}",
            reason
        );
        return None;
    }

    if !args.cookie_path.starts_with('/') || args.cookie_path.contains(';') {
        error!(path = %args.cookie_path, "Cookie path must start with / and contain no ;");
        return None;
    }

    if args.insecure_cookies {
        warn!("Secure cookie attribute disabled, refresh tokens may travel over plain HTTP");
    }

    Some(ServerConfig {
        db,
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        durations,
        password: PasswordConfig::default(),
        secure_cookies: !args.insecure_cookies,
        trust_forwarded_for: args.trust_forwarded_for,
        rate_limit_per_minute: args.rate_limit,
        reuse_grace_secs: args.reuse_grace,
        cookie_path: args.cookie_path.clone(),
    })
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
