#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use jobtrack::{
    ServerConfig,
    api::DEFAULT_REUSE_GRACE_SECS,
    auth::REFRESH_COOKIE_PATH,
    create_app,
    db::Database,
    jwt::{JwtConfig, TokenDurations},
    password::PasswordConfig,
    start_server,
};
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";

/// Client IP sent in X-Forwarded-For by the request helpers.
pub const TEST_IP: &str = "10.0.0.1";

/// Cheapest Argon2 parameters so tests do not spend seconds hashing.
pub fn cheap_passwords() -> PasswordConfig {
    PasswordConfig {
        memory_cost: 8,
        time_cost: 1,
        parallelism: 1,
    }
}

pub fn test_config(db: Database) -> ServerConfig {
    ServerConfig {
        db,
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        durations: TokenDurations::default(),
        password: cheap_passwords(),
        secure_cookies: false,
        trust_forwarded_for: true,
        rate_limit_per_minute: 1000,
        reuse_grace_secs: DEFAULT_REUSE_GRACE_SECS,
        cookie_path: REFRESH_COOKIE_PATH.to_string(),
    }
}

pub fn test_jwt() -> JwtConfig {
    JwtConfig::new(ACCESS_SECRET, REFRESH_SECRET)
}

/// Create a test app and return (app, db, jwt_config).
pub async fn create_test_app() -> (Router, Database, JwtConfig) {
    create_test_app_with(|_| {}).await
}

/// Create a test app after adjusting the default test configuration.
pub async fn create_test_app_with(
    adjust: impl FnOnce(&mut ServerConfig),
) -> (Router, Database, JwtConfig) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let mut config = test_config(db.clone());
    adjust(&mut config);
    let jwt = JwtConfig::with_durations(
        &config.access_secret,
        &config.refresh_secret,
        config.durations,
    );
    (create_app(&config), db, jwt)
}

/// Number of refresh tokens a user can still refresh with.
pub async fn active_refresh_tokens(db: &Database, user_id: i64) -> i64 {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM refresh_tokens WHERE user_id = ? AND consumed_at IS NULL",
    )
    .bind(user_id)
    .fetch_one(db.pool())
    .await
    .unwrap();
    count
}

/// JSON request from `TEST_IP`.
pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", TEST_IP)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// JSON request carrying a bearer token.
pub fn authed_request(
    method: &str,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header("x-forwarded-for", TEST_IP);

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Request to the refresh endpoint with an optional refresh cookie.
pub fn refresh_request(method: &str, refresh_token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri("/refresh")
        .header("x-forwarded-for", TEST_IP);
    if let Some(token) = refresh_token {
        builder = builder.header(header::COOKIE, format!("refresh_token={}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// All Set-Cookie values of a response.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// The refresh token value set by a response, if any.
pub fn refresh_token_from(response: &Response<Body>) -> Option<String> {
    set_cookies(response).iter().find_map(|cookie| {
        cookie
            .split(';')
            .next()
            .and_then(|pair| pair.strip_prefix("refresh_token="))
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string())
    })
}

pub async fn register(app: &Router, user: &str, pwd: &str) -> Response<Body> {
    app.clone()
        .oneshot(json_request(
            "POST",
            "/register",
            serde_json::json!({ "user": user, "pwd": pwd }),
        ))
        .await
        .unwrap()
}

pub async fn login(app: &Router, user: &str, pwd: &str) -> Response<Body> {
    app.clone()
        .oneshot(json_request(
            "POST",
            "/auth",
            serde_json::json!({ "user": user, "pwd": pwd }),
        ))
        .await
        .unwrap()
}

/// Register and log in. Returns (access_token, refresh_token).
pub async fn register_and_login(app: &Router, user: &str, pwd: &str) -> (String, String) {
    assert_eq!(register(app, user, pwd).await.status(), StatusCode::CREATED);

    let response = login(app, user, pwd).await;
    assert_eq!(response.status(), StatusCode::OK);
    let refresh = refresh_token_from(&response).expect("login sets refresh cookie");
    let body = body_json(response).await;
    let access = body["accessToken"].as_str().unwrap().to_string();
    (access, refresh)
}

/// Start a real server on a random port. Returns (base_url, db, handle).
pub async fn start_test_server() -> (String, Database, tokio::task::JoinHandle<()>) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let mut config = test_config(db.clone());
    config.trust_forwarded_for = false;

    let (handle, addr) = start_server(config, 0)
        .await
        .expect("Failed to start server");
    (format!("http://{}", addr), db, handle)
}
