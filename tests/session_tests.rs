//! Session endpoint tests: refresh rotation, profile lookup, verification.

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use gatekey::db::{Database, TokenUpdate};
use gatekey::identity::Identity;
use gatekey::jwt::TokenCodec;
use gatekey::{ServerConfig, create_app};
use tower::ServiceExt;

const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";

async fn create_test_app() -> (axum::Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let config = ServerConfig {
        db: db.clone(),
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        access_ttl_minutes: 30,
        refresh_ttl_days: 7,
        mailer: None,
    };
    (create_app(&config), db)
}

/// Seed a confirmed user with an issued session and a known refresh token.
async fn seed_session(db: &Database) -> (String, String) {
    let identity = Identity::new(db.users());
    let hash = identity.hash_password("correct horse").unwrap();
    let user = identity
        .create_user("alice", "a@x.com", &hash)
        .await
        .unwrap();

    let access = TokenCodec::new(ACCESS_SECRET, Duration::from_secs(1800))
        .encode(&user.uuid, &["user".to_string()])
        .unwrap();
    db.refresh_sessions()
        .upsert(
            &user.uuid,
            TokenUpdate {
                access_token: Some(&access),
                refresh_token: Some("seed-refresh"),
            },
        )
        .await
        .unwrap();

    (user.uuid, access)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_with_bearer(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

// --- Refresh tests ---

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let (app, db) = create_test_app().await;
    let (uuid, _) = seed_session(&db).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/session/refresh",
            serde_json::json!({ "refresh_token": "seed-refresh" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let new_access = json["token"].as_str().unwrap().to_string();
    let new_refresh = json["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, "seed-refresh");

    // Still exactly one record, holding the rotated pair
    assert_eq!(db.refresh_sessions().count_for_user(&uuid).await.unwrap(), 1);
    let record = db
        .refresh_sessions()
        .find_by_user(&uuid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.access_token.as_deref(), Some(new_access.as_str()));
    assert_eq!(record.refresh_token.as_deref(), Some(new_refresh.as_str()));

    // Old refresh token is dead, the new one works
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/session/refresh",
            serde_json::json!({ "refresh_token": "seed-refresh" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(post_json(
            "/api/session/refresh",
            serde_json::json!({ "refresh_token": new_refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_with_expired_access_token_succeeds() {
    let (app, db) = create_test_app().await;
    let (uuid, _) = seed_session(&db).await;

    // Overwrite the stored access token with an already-expired one
    let expired = TokenCodec::new(ACCESS_SECRET, Duration::from_secs(0))
        .encode(&uuid, &["user".to_string()])
        .unwrap();
    db.refresh_sessions()
        .upsert(
            &uuid,
            TokenUpdate {
                access_token: Some(&expired),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/api/session/refresh",
            serde_json::json!({ "refresh_token": "seed-refresh" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_unknown_token_not_found() {
    let (app, db) = create_test_app().await;
    seed_session(&db).await;

    let response = app
        .oneshot(post_json(
            "/api/session/refresh",
            serde_json::json!({ "refresh_token": "no-such-token" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_refresh_with_tampered_stored_access_token_rejected() {
    let (app, db) = create_test_app().await;
    let (uuid, _) = seed_session(&db).await;

    let forged = TokenCodec::new(b"some-other-secret-0123456789abcdef", Duration::from_secs(1800))
        .encode(&uuid, &[])
        .unwrap();
    db.refresh_sessions()
        .upsert(
            &uuid,
            TokenUpdate {
                access_token: Some(&forged),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/api/session/refresh",
            serde_json::json!({ "refresh_token": "seed-refresh" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// --- Profile tests ---

#[tokio::test]
async fn test_me_returns_split_display_name() {
    let (app, db) = create_test_app().await;
    let (uuid, access) = seed_session(&db).await;

    sqlx::query("UPDATE users SET display_name = 'Nguyen Van An' WHERE uuid = ?")
        .bind(&uuid)
        .execute(db.pool())
        .await
        .unwrap();

    let response = app
        .oneshot(get_with_bearer("/api/session/me", &access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["last_name"], "Nguyen");
    assert_eq!(json["first_name"], "Van An");
    assert_eq!(json["email"], "a@x.com");
}

#[tokio::test]
async fn test_me_requires_bearer_token() {
    let (app, _db) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/session/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_rejects_expired_token() {
    let (app, db) = create_test_app().await;
    let (uuid, _) = seed_session(&db).await;

    let expired = TokenCodec::new(ACCESS_SECRET, Duration::from_secs(0))
        .encode(&uuid, &[])
        .unwrap();

    let response = app
        .oneshot(get_with_bearer("/api/session/me", &expired))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// --- Verification tests ---

#[tokio::test]
async fn test_verify_valid_token() {
    let (app, db) = create_test_app().await;
    let (_, access) = seed_session(&db).await;

    let response = app
        .oneshot(get_with_bearer("/api/session/verify", &access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_verify_rejects_garbage_and_foreign_tokens() {
    let (app, db) = create_test_app().await;
    let (uuid, _) = seed_session(&db).await;

    let response = app
        .clone()
        .oneshot(get_with_bearer("/api/session/verify", "not.a.token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A refresh-secret-signed token must not pass access verification
    let foreign = TokenCodec::new(REFRESH_SECRET, Duration::from_secs(1800))
        .encode(&uuid, &[])
        .unwrap();
    let response = app
        .oneshot(get_with_bearer("/api/session/verify", &foreign))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
