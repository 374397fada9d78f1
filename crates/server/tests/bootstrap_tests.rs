//! Tests for admin account bootstrap behavior.

mod common;

use axum::http::StatusCode;
use common::{ADMIN_TOKEN, TestServer, json_request};
use photosync_core::config::AdminConfig;
use photosync_metadata::models::UserRow;
use photosync_server::auth::hash_token;
use photosync_server::bootstrap::ensure_admin;
use time::OffsetDateTime;
use uuid::Uuid;

fn admin_config(raw_token: &str) -> AdminConfig {
    AdminConfig {
        token_hash: format!("sha256:{}", hash_token(raw_token)),
        ..AdminConfig::for_testing()
    }
}

#[tokio::test]
async fn test_bootstrap_creates_admin_and_token() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    let admin = metadata
        .get_user_by_username("admin")
        .await
        .unwrap()
        .expect("Admin user should exist");
    assert!(admin.is_admin);
    assert_eq!(admin.user_id, server.admin_id);

    let bootstrap_id = metadata
        .get_bootstrap_token_id()
        .await
        .unwrap()
        .expect("Bootstrap token should be recorded");
    let token = metadata.get_token(bootstrap_id).await.unwrap().unwrap();
    assert_eq!(token.token_hash, hash_token(ADMIN_TOKEN));
    assert_eq!(token.user_id, admin.user_id);
    assert!(token.revoked_at.is_none());

    let (status, body) =
        json_request(&server.router, "GET", "/auth/whoami", None, Some(ADMIN_TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "admin");
}

#[tokio::test]
async fn test_bootstrap_is_idempotent() {
    let server = TestServer::new().await;
    let metadata = server.metadata();
    let before = metadata.get_bootstrap_token_id().await.unwrap();

    let admin_id = ensure_admin(metadata.as_ref(), &AdminConfig::for_testing())
        .await
        .expect("Bootstrap should succeed");

    assert_eq!(admin_id, server.admin_id);
    assert_eq!(metadata.get_bootstrap_token_id().await.unwrap(), before);
    assert_eq!(
        metadata.list_tokens_for_user(admin_id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_bootstrap_accepts_uppercase_hash_without_prefix() {
    let server = TestServer::new().await;
    let config = AdminConfig {
        token_hash: hash_token(ADMIN_TOKEN).to_uppercase(),
        ..AdminConfig::for_testing()
    };

    ensure_admin(server.metadata().as_ref(), &config)
        .await
        .expect("Bootstrap should succeed");

    assert_eq!(
        server
            .metadata()
            .list_tokens_for_user(server.admin_id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_bootstrap_rotates_token_when_hash_changes() {
    let server = TestServer::new().await;
    let metadata = server.metadata();
    let old_id = metadata.get_bootstrap_token_id().await.unwrap().unwrap();

    ensure_admin(metadata.as_ref(), &admin_config("rotated-admin-token"))
        .await
        .expect("Bootstrap should succeed");

    let new_id = metadata.get_bootstrap_token_id().await.unwrap().unwrap();
    assert_ne!(new_id, old_id);
    let old = metadata.get_token(old_id).await.unwrap().unwrap();
    assert!(old.revoked_at.is_some(), "Previous token should be revoked");

    let (status, _) =
        json_request(&server.router, "GET", "/auth/whoami", None, Some(ADMIN_TOKEN)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = json_request(
        &server.router,
        "GET",
        "/auth/whoami",
        None,
        Some("rotated-admin-token"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isAdmin"], true);
}

#[tokio::test]
async fn test_bootstrap_rejects_revoked_token() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    // Rotate away, then try to go back to the revoked hash
    ensure_admin(metadata.as_ref(), &admin_config("rotated-admin-token"))
        .await
        .unwrap();
    let result = ensure_admin(metadata.as_ref(), &AdminConfig::for_testing()).await;

    let err = result.expect_err("Reusing a revoked hash should fail");
    assert!(err.to_string().contains("revoked"), "{err}");
}

#[tokio::test]
async fn test_bootstrap_rejects_invalid_hash_format() {
    let server = TestServer::new().await;

    let bad_chars = "g".repeat(64);
    for token_hash in ["", "sha256:abc", bad_chars.as_str()] {
        let config = AdminConfig {
            token_hash: token_hash.to_string(),
            ..AdminConfig::for_testing()
        };
        let result = ensure_admin(server.metadata().as_ref(), &config).await;
        assert!(result.is_err(), "{token_hash:?} should be rejected");
    }
}

#[tokio::test]
async fn test_bootstrap_refuses_non_admin_username() {
    let server = TestServer::new().await;
    server
        .metadata()
        .create_user(&UserRow {
            user_id: Uuid::new_v4(),
            username: "operator".to_string(),
            is_admin: false,
            created_at: OffsetDateTime::now_utc(),
        })
        .await
        .unwrap();

    let config = AdminConfig {
        username: "operator".to_string(),
        ..admin_config("operator-token")
    };
    let err = ensure_admin(server.metadata().as_ref(), &config)
        .await
        .expect_err("A regular account must not be promoted");

    assert!(err.to_string().contains("non-admin"), "{err}");
}

#[tokio::test]
async fn test_bootstrap_refuses_hash_issued_to_another_user() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;

    let result = ensure_admin(server.metadata().as_ref(), &admin_config(&alice.token)).await;

    let err = result.expect_err("Another user's token must not become the admin token");
    assert!(err.to_string().contains("another user"), "{err}");
}
