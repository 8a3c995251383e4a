//! Tests for the dual-token authentication system.
//!
//! Tests cover:
//! - Access tokens accepted and rejected by the bearer verifier
//! - Refresh flow from the cookie alone
//! - Refresh token rotation and reuse detection
//! - Concurrent refreshes with one cookie inside the grace window
//! - Logout revoking the refresh token
//! - Refresh for a user that no longer exists

mod common;

use axum::http::{StatusCode, header};
use common::{
    active_refresh_tokens, authed_request, body_json, create_test_app, create_test_app_with,
    login, refresh_request, refresh_token_from, register, register_and_login, set_cookies,
};
use jobtrack::jwt::{TokenDurations, unix_now};
use tower::ServiceExt;

#[tokio::test]
async fn test_fresh_access_token_passes_verifier() {
    let (app, _, _) = create_test_app().await;
    let (access, _) = register_and_login(&app, "alice", "pw1").await;

    let response = app
        .oneshot(authed_request("GET", "/jobs", &access, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_expired_access_token_rejected() {
    let (app, db, jwt) = create_test_app().await;
    register_and_login(&app, "alice", "pw1").await;
    let user = db.users().find_by_username("alice").await.unwrap().unwrap();

    let ttl = jwt.durations().access_secs;
    let expired = jwt
        .generate_access_token_at(user.id, "alice", unix_now().unwrap() - ttl - 60)
        .unwrap();

    let response = app
        .oneshot(authed_request("GET", "/jobs", &expired.token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid or expired token");
}

#[tokio::test]
async fn test_missing_and_malformed_bearer() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .uri("/jobs")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            axum::http::Request::builder()
                .uri("/jobs")
                .header(header::AUTHORIZATION, "Basic YWxpY2U6cHcx")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_token_is_not_a_bearer() {
    let (app, _, _) = create_test_app().await;
    let (_, refresh) = register_and_login(&app, "alice", "pw1").await;

    let response = app
        .oneshot(authed_request("GET", "/jobs", &refresh, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_without_cookie() {
    let (app, _, _) = create_test_app().await;

    let response = app.oneshot(refresh_request("GET", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The browser is told to drop whatever it has
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.contains("Max-Age=0")));
}

#[tokio::test]
async fn test_refresh_with_garbage_cookie() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(refresh_request("GET", Some("not-a-jwt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_token_is_not_a_refresh_token() {
    let (app, _, _) = create_test_app().await;
    let (access, _) = register_and_login(&app, "alice", "pw1").await;

    let response = app
        .oneshot(refresh_request("GET", Some(&access)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_returns_same_identity() {
    let (app, db, jwt) = create_test_app().await;
    let (_, refresh) = register_and_login(&app, "alice", "pw1").await;
    let user = db.users().find_by_username("alice").await.unwrap().unwrap();

    let response = app
        .clone()
        .oneshot(refresh_request("GET", Some(&refresh)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(refresh_token_from(&response).is_some());

    let body = body_json(response).await;
    assert_eq!(body["user"], "alice");
    let access = body["accessToken"].as_str().unwrap();
    let claims = jwt.validate_access_token(access).unwrap();
    assert_eq!(claims.sub, "alice");
    assert_eq!(claims.uid, user.id);

    let response = app
        .oneshot(authed_request("GET", "/jobs", access, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_rotates_token() {
    let (app, db, jwt) = create_test_app().await;
    let (_, refresh) = register_and_login(&app, "alice", "pw1").await;
    let old_jti = jwt.validate_refresh_token(&refresh).unwrap().jti;

    let response = app
        .oneshot(refresh_request("GET", Some(&refresh)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let new_refresh = refresh_token_from(&response).unwrap();
    let new_jti = jwt.validate_refresh_token(&new_refresh).unwrap().jti;
    assert_ne!(old_jti, new_jti);

    let old = db.tokens().get_by_jti(&old_jti).await.unwrap().unwrap();
    assert!(old.consumed_at.is_some());
    assert_eq!(old.replaced_by.as_deref(), Some(new_jti.as_str()));

    let new = db.tokens().get_by_jti(&new_jti).await.unwrap().unwrap();
    assert!(new.consumed_at.is_none());
}

#[tokio::test]
async fn test_rotated_token_reuse_revokes_everything() {
    let (app, db, _) = create_test_app_with(|c| c.reuse_grace_secs = 0).await;
    let (_, stolen) = register_and_login(&app, "alice", "pw1").await;
    let user = db.users().find_by_username("alice").await.unwrap().unwrap();

    // Legitimate client rotates
    let response = app
        .clone()
        .oneshot(refresh_request("GET", Some(&stolen)))
        .await
        .unwrap();
    let current = refresh_token_from(&response).unwrap();

    // Attacker replays the old token
    let response = app
        .clone()
        .oneshot(refresh_request("GET", Some(&stolen)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(active_refresh_tokens(&db, user.id).await, 0);

    // The legitimate client's newest token is gone as well
    let response = app
        .oneshot(refresh_request("GET", Some(&current)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_concurrent_refreshes_with_one_cookie() {
    let (app, db, _) = create_test_app().await;
    let (_, shared) = register_and_login(&app, "alice", "pw1").await;
    let user = db.users().find_by_username("alice").await.unwrap().unwrap();

    // Two tabs wake up at once and both present the same cookie
    let (a, b) = tokio::join!(
        app.clone().oneshot(refresh_request("GET", Some(&shared))),
        app.clone().oneshot(refresh_request("GET", Some(&shared))),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.status(), StatusCode::OK);
    assert_eq!(b.status(), StatusCode::OK);

    let a = refresh_token_from(&a).unwrap();
    let b = refresh_token_from(&b).unwrap();
    assert_ne!(a, b);
    assert_eq!(active_refresh_tokens(&db, user.id).await, 2);

    // Neither tab was logged out
    for token in [a, b] {
        let response = app
            .clone()
            .oneshot(refresh_request("GET", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_replay_after_grace_window_revokes_everything() {
    let (app, db, jwt) = create_test_app().await;
    let (_, old) = register_and_login(&app, "alice", "pw1").await;
    let user = db.users().find_by_username("alice").await.unwrap().unwrap();

    let response = app
        .clone()
        .oneshot(refresh_request("GET", Some(&old)))
        .await
        .unwrap();
    let current = refresh_token_from(&response).unwrap();

    // Rotated an hour ago
    let jti = jwt.validate_refresh_token(&old).unwrap().jti;
    sqlx::query("UPDATE refresh_tokens SET consumed_at = consumed_at - 3600 WHERE jti = ?")
        .bind(&jti)
        .execute(db.pool())
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(refresh_request("GET", Some(&old)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(active_refresh_tokens(&db, user.id).await, 0);

    let response = app
        .oneshot(refresh_request("GET", Some(&current)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cookie_path_is_configurable() {
    let (app, _, _) =
        create_test_app_with(|c| c.cookie_path = "/api/refresh".to_string()).await;
    register(&app, "alice", "pw1").await;

    let response = login(&app, "alice", "pw1").await;
    assert!(set_cookies(&response)[0].contains("Path=/api/refresh;"));

    let response = app.oneshot(refresh_request("DELETE", None)).await.unwrap();
    assert!(set_cookies(&response)[0].contains("Path=/api/refresh;"));
}

#[tokio::test]
async fn test_expired_refresh_token_rejected() {
    let (app, db, jwt) = create_test_app().await;
    register_and_login(&app, "alice", "pw1").await;
    let user = db.users().find_by_username("alice").await.unwrap().unwrap();

    let issued = unix_now().unwrap() - jwt.durations().refresh_secs - 60;
    let expired = jwt.generate_refresh_token_at("alice", issued).unwrap();
    db.tokens()
        .create(
            &expired.jti,
            user.id,
            None,
            expired.issued_at,
            expired.expires_at,
        )
        .await
        .unwrap();

    let response = app
        .oneshot(refresh_request("GET", Some(&expired.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_for_deleted_user_is_internal_error() {
    let (app, db, _) = create_test_app().await;
    let (_, refresh) = register_and_login(&app, "alice", "pw1").await;
    let user = db.users().find_by_username("alice").await.unwrap().unwrap();

    db.users().delete(user.id).await.unwrap();

    let response = app
        .oneshot(refresh_request("GET", Some(&refresh)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Internal server error");
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let (app, db, jwt) = create_test_app().await;
    let (_, refresh) = register_and_login(&app, "alice", "pw1").await;
    let jti = jwt.validate_refresh_token(&refresh).unwrap().jti;

    let response = app
        .clone()
        .oneshot(refresh_request("DELETE", Some(&refresh)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("refresh_token=;"));
    assert!(cookies[0].contains("Max-Age=0"));
    assert!(cookies[0].contains("Path=/refresh"));

    assert!(db.tokens().get_by_jti(&jti).await.unwrap().is_none());

    let response = app
        .oneshot(refresh_request("GET", Some(&refresh)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_cookie() {
    let (app, _, _) = create_test_app().await;

    let response = app.oneshot(refresh_request("DELETE", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_custom_durations() {
    let durations = TokenDurations {
        access_secs: 60,
        refresh_secs: 120,
    };
    let (app, _, jwt) = create_test_app_with(|c| c.durations = durations).await;
    let (access, refresh) = register_and_login(&app, "alice", "pw1").await;

    let claims = jwt.validate_access_token(&access).unwrap();
    assert_eq!(claims.exp - claims.iat, 60);
    let claims = jwt.validate_refresh_token(&refresh).unwrap();
    assert_eq!(claims.exp - claims.iat, 120);

    let response = app
        .oneshot(refresh_request("GET", Some(&refresh)))
        .await
        .unwrap();
    assert!(set_cookies(&response)[0].contains("Max-Age=120"));
}
