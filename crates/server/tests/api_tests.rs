//! Integration tests for the identity and photo catalog endpoints.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::fixtures::{content_hash, jpeg_bytes, seeded_bytes};
use common::{ADMIN_TOKEN, TestServer, json_request, raw_request};
use photosync_server::thumbnails;
use serde_json::{Value, json};
use uuid::Uuid;

#[tokio::test]
async fn test_health_check_is_public() {
    let server = TestServer::new().await;

    let (status, body) = json_request(&server.router, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "filesystem");
}

#[tokio::test]
async fn test_metrics_endpoint_respects_config() {
    let server = TestServer::new().await;
    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let (status, _) = raw_request(&server.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let server = TestServer::with_config(|c| c.server.metrics_enabled = false).await;
    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let (status, _) = raw_request(&server.router, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_authentication_required() {
    let server = TestServer::new().await;

    let (status, body) = json_request(&server.router, "GET", "/photos", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) =
        json_request(&server.router, "GET", "/photos", None, Some("not-a-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoked_token_rejected() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;

    let (status, _) =
        json_request(&server.router, "GET", "/auth/whoami", None, Some(&alice.token)).await;
    assert_eq!(status, StatusCode::OK);

    let token = server
        .metadata()
        .list_tokens_for_user(alice.user_id)
        .await
        .unwrap()
        .remove(0);
    server
        .metadata()
        .revoke_token(token.token_id, time::OffsetDateTime::now_utc())
        .await
        .unwrap();

    let (status, body) =
        json_request(&server.router, "GET", "/auth/whoami", None, Some(&alice.token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "token revoked");
}

#[tokio::test]
async fn test_whoami_reports_admin() {
    let server = TestServer::new().await;

    let (status, body) =
        json_request(&server.router, "GET", "/auth/whoami", None, Some(ADMIN_TOKEN)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isAdmin"], true);
    assert_eq!(body["userId"], server.admin_id.to_string());
}

#[tokio::test]
async fn test_admin_creates_user_with_working_key() {
    let server = TestServer::new().await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/admin/users",
        Some(json!({"username": "bob"})),
        Some(ADMIN_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let api_key = body["apiKey"].as_str().unwrap().to_string();

    let (status, whoami) =
        json_request(&server.router, "GET", "/auth/whoami", None, Some(&api_key)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(whoami["username"], "bob");
    assert_eq!(whoami["isAdmin"], false);

    // Usernames are unique
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/admin/users",
        Some(json!({"username": "bob"})),
        Some(ADMIN_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");
}

#[tokio::test]
async fn test_non_admin_cannot_create_users() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/admin/users",
        Some(json!({"username": "mallory"})),
        Some(&alice.token),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn test_register_and_list_devices() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let bob = server.create_user("bob").await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/devices",
        Some(json!({"deviceName": "Alice's iPhone", "platform": "ios"})),
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["deviceName"], "Alice's iPhone");

    let (_, alice_devices) =
        json_request(&server.router, "GET", "/devices", None, Some(&alice.token)).await;
    assert_eq!(alice_devices.as_array().unwrap().len(), 1);

    let (_, bob_devices) =
        json_request(&server.router, "GET", "/devices", None, Some(&bob.token)).await;
    assert!(bob_devices.as_array().unwrap().is_empty());

    let (status, _) = json_request(
        &server.router,
        "POST",
        "/devices",
        Some(json!({"deviceName": "   "})),
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_places_file_under_device_folder() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let device = server.create_device(alice.user_id, "Pixel 8").await;
    let data = seeded_bytes(1, 2048);

    let (status, body) = server
        .upload(
            &alice.token,
            &format!("filename=IMG_0001.jpg&deviceId={device}&dateTaken=2024-03-05T10:00:00Z"),
            data.clone(),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["duplicate"], false);
    assert_eq!(body["contentHash"], content_hash(&data));
    assert_eq!(body["storedPath"], "devices/pixel_8/2024/03/IMG_0001.jpg");

    let stored = server
        .storage()
        .get("devices/pixel_8/2024/03/IMG_0001.jpg")
        .await
        .unwrap();
    assert_eq!(stored, data);

    // The ownership record travels with the file
    let photo_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
    let record = server
        .state
        .codec
        .read("devices/pixel_8/2024/03/IMG_0001.jpg")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.photo_id, Some(photo_id));
    assert_eq!(record.user_id, Some(alice.user_id));
    assert_eq!(record.device_id, Some(device));
}

#[tokio::test]
async fn test_duplicate_upload_is_idempotent() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let data = seeded_bytes(2, 4096);

    let (status, first) = server
        .upload(&alice.token, "filename=a.jpg", data.clone())
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, second) = server
        .upload(&alice.token, "filename=renamed.jpg", data.clone())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["duplicate"], true);
    assert_eq!(second["id"], first["id"]);
    assert_eq!(second["storedPath"], first["storedPath"]);
    assert_eq!(second["uploadedAt"], first["uploadedAt"]);

    assert_eq!(
        server
            .metadata()
            .count_photos_for_user(alice.user_id)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_concurrent_identical_uploads_store_once() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let data = seeded_bytes(3, 8192);

    let uploads = (0..4).map(|_| server.upload(&alice.token, "filename=same.jpg", data.clone()));
    let results = futures::future::join_all(uploads).await;

    let ids: std::collections::HashSet<String> = results
        .iter()
        .map(|(status, body)| {
            assert!(status.is_success(), "unexpected status {status}: {body}");
            body["id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(
        server
            .metadata()
            .count_photos_for_user(alice.user_id)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_same_filename_different_content_gets_suffix() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let query = "filename=IMG.jpg&dateTaken=2024-01-01T00:00:00Z";

    let (_, first) = server.upload(&alice.token, query, seeded_bytes(4, 64)).await;
    let (status, second) = server.upload(&alice.token, query, seeded_bytes(5, 64)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(first["storedPath"], second["storedPath"]);
    let suffix = &second["id"].as_str().unwrap()[..8];
    assert_eq!(
        second["storedPath"],
        format!("users/{}/2024/01/IMG_{suffix}.jpg", alice.user_id)
    );
}

#[tokio::test]
async fn test_reserved_filenames_cannot_shadow_sidecars() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let device = server.create_device(alice.user_id, "cam").await;
    let base = format!("deviceId={device}&dateTaken=2024-01-15T00:00:00Z");

    let (status, shadow) = server
        .upload(
            &alice.token,
            &format!("filename=a.jpg.psmeta.json&{base}"),
            seeded_bytes(20, 64),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(shadow["storedPath"], "devices/cam/2024/01/a.jpg_psmeta.json");

    let (status, photo) = server
        .upload(&alice.token, &format!("filename=a.jpg&{base}"), seeded_bytes(21, 64))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(photo["storedPath"], "devices/cam/2024/01/a.jpg");

    let (status, staged) = server
        .upload(&alice.token, &format!("filename=b.tmp.jpg&{base}"), seeded_bytes(22, 64))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(staged["storedPath"], "devices/cam/2024/01/b_tmp.jpg");

    // Neither file was overwritten by the other's ownership record
    for body in [&shadow, &photo, &staged] {
        let uri = format!("/admin/scanner/verify?photoId={}", body["id"].as_str().unwrap());
        let (status, report) =
            json_request(&server.router, "GET", &uri, None, Some(ADMIN_TOKEN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["matches"], true, "{report}");
    }
}

#[tokio::test]
async fn test_occupied_sidecar_slot_moves_upload_aside() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let stray_record = seeded_bytes(23, 32);
    let sidecar = format!("users/{}/2024/01/b.jpg.psmeta.json", alice.user_id);
    server.storage().put(&sidecar, stray_record.clone()).await.unwrap();

    let (status, body) = server
        .upload(
            &alice.token,
            "filename=b.jpg&dateTaken=2024-01-15T00:00:00Z",
            seeded_bytes(24, 64),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    let suffix = &body["id"].as_str().unwrap()[..8];
    assert_eq!(
        body["storedPath"],
        format!("users/{}/2024/01/b_{suffix}.jpg", alice.user_id)
    );
    assert_eq!(server.storage().get(&sidecar).await.unwrap(), stray_record);
}

#[tokio::test]
async fn test_dot_device_name_still_uploads() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let device = server.create_device(alice.user_id, "..").await;

    let (status, body) = server
        .upload(
            &alice.token,
            &format!("filename=x.jpg&deviceId={device}&dateTaken=2024-02-01T00:00:00Z"),
            seeded_bytes(25, 64),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["storedPath"], "devices/unknown/2024/02/x.jpg");
}

#[tokio::test]
async fn test_upload_with_foreign_device_rejected() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let bob = server.create_user("bob").await;
    let bobs_device = server.create_device(bob.user_id, "Bob's phone").await;

    let (status, body) = server
        .upload(
            &alice.token,
            &format!("deviceId={bobs_device}"),
            seeded_bytes(6, 64),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");
}

#[tokio::test]
async fn test_empty_upload_rejected() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;

    let (status, _) = server
        .upload(&alice.token, "filename=a.jpg", bytes::Bytes::new())
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_check_hashes_partitions_and_normalizes() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let stored = seeded_bytes(7, 128);
    server.upload(&alice.token, "", stored.clone()).await;

    let known = content_hash(&stored);
    let unknown = content_hash(b"never uploaded");
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/photos/check",
        Some(json!({"hashes": [known.to_uppercase(), unknown, known]})),
        Some(&alice.token),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["existing"], json!([known]));
    assert_eq!(body["missing"], json!([unknown]));
}

#[tokio::test]
async fn test_check_hashes_batch_bounds() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;

    let (status, _) = json_request(
        &server.router,
        "POST",
        "/photos/check",
        Some(json!({"hashes": []})),
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let too_many: Vec<String> = (0..1001).map(|i| format!("{i:064x}")).collect();
    let (status, _) = json_request(
        &server.router,
        "POST",
        "/photos/check",
        Some(json!({"hashes": too_many})),
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let exactly: Vec<String> = (0..1000).map(|i| format!("{i:064x}")).collect();
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/photos/check",
        Some(json!({"hashes": exactly})),
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["missing"].as_array().unwrap().len(), 1000);
}

#[tokio::test]
async fn test_other_users_photo_reads_as_not_found() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let bob = server.create_user("bob").await;
    let (_, uploaded) = server.upload(&alice.token, "", seeded_bytes(8, 64)).await;
    let id = uploaded["id"].as_str().unwrap();

    let (status, body) = json_request(
        &server.router,
        "GET",
        &format!("/photos/{id}"),
        None,
        Some(&bob.token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
    assert_eq!(body["message"], "photo not found");

    // Same answer as for an id that never existed
    let (_, missing) = json_request(
        &server.router,
        "GET",
        &format!("/photos/{}", Uuid::new_v4()),
        None,
        Some(&bob.token),
    )
    .await;
    assert_eq!(missing, body);

    // Admins see everything
    let (status, _) = json_request(
        &server.router,
        "GET",
        &format!("/photos/{id}"),
        None,
        Some(ADMIN_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_list_download_and_delete() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let data = seeded_bytes(9, 1000);
    let (_, uploaded) = server
        .upload(&alice.token, "filename=pic.png", data.clone())
        .await;
    let id = uploaded["id"].as_str().unwrap();
    let stored_path = uploaded["storedPath"].as_str().unwrap().to_string();

    let (status, list) =
        json_request(&server.router, "GET", "/photos?take=10", None, Some(&alice.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["photos"][0]["id"], id);

    let request = Request::builder()
        .uri(format!("/photos/{id}/file"))
        .header("Authorization", format!("Bearer {}", alice.token))
        .body(Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(server.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body, data);

    let (status, _) = json_request(
        &server.router,
        "DELETE",
        &format!("/photos/{id}"),
        None,
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!server.storage().exists(&stored_path).await.unwrap());
    assert!(
        server
            .state
            .codec
            .read(&stored_path)
            .await
            .unwrap()
            .is_none()
    );

    let (status, _) = json_request(
        &server.router,
        "GET",
        &format!("/photos/{id}"),
        None,
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_rejects_oversized_take() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;

    let (status, _) =
        json_request(&server.router, "GET", "/photos?take=101", None, Some(&alice.token)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_thumbnails_served_after_generation() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let (_, uploaded) = server
        .upload(&alice.token, "filename=real.jpg", jpeg_bytes(10))
        .await;
    let id: Uuid = uploaded["id"].as_str().unwrap().parse().unwrap();

    // Generate synchronously rather than waiting for the background task
    let photo = server.metadata().get_photo(id).await.unwrap().unwrap();
    thumbnails::regenerate(&server.state, &photo, None)
        .await
        .unwrap();

    let request = Request::builder()
        .uri(format!("/photos/{id}/thumbnail/small"))
        .header("Authorization", format!("Bearer {}", alice.token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = raw_request(&server.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(image::load_from_memory(&body).is_ok());

    let (status, _) = json_request(
        &server.router,
        "GET",
        &format!("/photos/{id}/thumbnail/huge"),
        None,
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, meta) = json_request(
        &server.router,
        "GET",
        &format!("/photos/{id}"),
        None,
        Some(&alice.token),
    )
    .await;
    assert_eq!(meta["hasThumbnails"], true);
    assert_eq!(meta["width"], 64);
    assert_eq!(meta["height"], 48);
}

#[tokio::test]
async fn test_backfill_requires_admin_and_bounds_limit() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;

    let (status, _) = json_request(
        &server.router,
        "POST",
        "/admin/thumbnails/backfill",
        None,
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = json_request(
        &server.router,
        "POST",
        "/admin/thumbnails/backfill?limit=0",
        None,
        Some(ADMIN_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/admin/thumbnails/backfill?limit=5",
        None,
        Some(ADMIN_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"limit": 5}));
}

#[tokio::test]
async fn test_malformed_json_is_invalid_argument() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;

    let request = Request::builder()
        .method("POST")
        .uri("/photos/check")
        .header("Authorization", format!("Bearer {}", alice.token))
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = raw_request(&server.router, request).await;
    let body: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");
}
