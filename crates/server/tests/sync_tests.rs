//! Integration tests for the multi-device sync feed.

mod common;

use axum::http::StatusCode;
use common::fixtures::photo_row;
use common::{TestServer, TestUser, json_request};
use photosync_core::catalog_timestamp;
use photosync_metadata::models::PhotoRow;
use serde_json::{Value, json};
use std::collections::HashSet;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

fn base_time() -> OffsetDateTime {
    catalog_timestamp(OffsetDateTime::now_utc() - Duration::days(30))
}

/// Insert `count` rows straight into the catalog, ten per uploaded_at second.
async fn seed_photos(
    server: &TestServer,
    owner: Uuid,
    device: Option<Uuid>,
    count: u64,
    seed_offset: u64,
) -> Vec<PhotoRow> {
    let base = base_time();
    let mut rows = Vec::with_capacity(count as usize);
    for i in 0..count {
        let uploaded_at = base + Duration::seconds((i / 10) as i64);
        let row = photo_row(owner, device, uploaded_at, seed_offset + i);
        server.metadata().insert_photo(&row).await.unwrap();
        rows.push(row);
    }
    rows
}

async fn sync_page(server: &TestServer, user: &TestUser, body: Value) -> (StatusCode, Value) {
    json_request(&server.router, "POST", "/sync/photos", Some(body), Some(&user.token)).await
}

/// Follow cursors to the end of the feed.
async fn drain(server: &TestServer, user: &TestUser, device: Uuid, limit: u32) -> Vec<Uuid> {
    let mut ids = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let (status, page) = sync_page(
            server,
            user,
            json!({"deviceId": device, "cursor": cursor, "limit": limit}),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{page}");
        let photos = page["photos"].as_array().unwrap();
        assert!(photos.len() <= limit as usize);
        ids.extend(
            photos
                .iter()
                .map(|p| p["id"].as_str().unwrap().parse::<Uuid>().unwrap()),
        );
        if page["hasMore"] == false {
            assert!(page["nextCursor"].is_null());
            break;
        }
        cursor = Some(page["nextCursor"].as_str().unwrap().to_string());
    }
    ids
}

fn feed_order(rows: &[PhotoRow]) -> Vec<Uuid> {
    let mut sorted: Vec<_> = rows.iter().map(|r| (r.uploaded_at, r.id)).collect();
    sorted.sort();
    sorted.into_iter().map(|(_, id)| id).collect()
}

#[tokio::test]
async fn test_cursor_walk_returns_every_photo_once() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let device = server.create_device(alice.user_id, "phone").await;
    let rows = seed_photos(&server, alice.user_id, None, 500, 0).await;
    let expected = feed_order(&rows);

    let small_pages = drain(&server, &alice, device, 7).await;
    assert_eq!(small_pages.len(), 500);
    assert_eq!(small_pages.iter().collect::<HashSet<_>>().len(), 500);
    assert_eq!(small_pages, expected);

    let one_page = drain(&server, &alice, device, 500).await;
    assert_eq!(one_page, expected);
}

#[tokio::test]
async fn test_exact_multiple_of_limit_ends_cleanly() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let device = server.create_device(alice.user_id, "phone").await;
    seed_photos(&server, alice.user_id, None, 10, 0).await;

    let (_, first) = sync_page(&server, &alice, json!({"deviceId": device, "limit": 5})).await;
    assert_eq!(first["hasMore"], true);

    let (_, second) = sync_page(
        &server,
        &alice,
        json!({"deviceId": device, "limit": 5, "cursor": first["nextCursor"]}),
    )
    .await;
    assert_eq!(second["photos"].as_array().unwrap().len(), 5);
    assert_eq!(second["hasMore"], false);
    assert!(second["nextCursor"].is_null());
}

#[tokio::test]
async fn test_inserts_during_walk_are_not_lost() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let device = server.create_device(alice.user_id, "phone").await;
    let rows = seed_photos(&server, alice.user_id, None, 20, 0).await;

    let (_, first) = sync_page(&server, &alice, json!({"deviceId": device, "limit": 8})).await;
    let mut seen: Vec<String> = first["photos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().to_string())
        .collect();

    // A newer upload lands mid-walk
    let late = photo_row(
        alice.user_id,
        None,
        catalog_timestamp(OffsetDateTime::now_utc()),
        1000,
    );
    server.metadata().insert_photo(&late).await.unwrap();

    let mut cursor = first["nextCursor"].clone();
    loop {
        let (_, page) = sync_page(
            &server,
            &alice,
            json!({"deviceId": device, "limit": 8, "cursor": cursor}),
        )
        .await;
        seen.extend(
            page["photos"]
                .as_array()
                .unwrap()
                .iter()
                .map(|p| p["id"].as_str().unwrap().to_string()),
        );
        if page["hasMore"] == false {
            break;
        }
        cursor = page["nextCursor"].clone();
    }

    assert_eq!(seen.len(), 21);
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 21);
    assert_eq!(seen.last().unwrap(), &late.id.to_string());
    assert!(rows.iter().all(|r| seen.contains(&r.id.to_string())));
}

#[tokio::test]
async fn test_feed_scoped_to_owner_with_origin_details() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let bob = server.create_user("bob").await;
    let phone = server.create_device(alice.user_id, "Alice's phone").await;
    let tablet = server.create_device(alice.user_id, "Alice's tablet").await;
    seed_photos(&server, alice.user_id, Some(tablet), 3, 0).await;
    seed_photos(&server, bob.user_id, None, 4, 100).await;

    let (status, page) = sync_page(&server, &alice, json!({"deviceId": phone})).await;

    assert_eq!(status, StatusCode::OK);
    let photos = page["photos"].as_array().unwrap();
    assert_eq!(photos.len(), 3);
    for photo in photos {
        assert_eq!(photo["originDeviceId"], tablet.to_string());
        assert_eq!(photo["originDeviceName"], "Alice's tablet");
        assert_eq!(photo["originPlatform"], "ios");
        assert_eq!(photo["isCurrentDevice"], false);
    }

    let (_, from_tablet) = sync_page(&server, &alice, json!({"deviceId": tablet})).await;
    assert_eq!(from_tablet["photos"][0]["isCurrentDevice"], true);
}

#[tokio::test]
async fn test_since_timestamp_filters_older_photos() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let device = server.create_device(alice.user_id, "phone").await;
    let rows = seed_photos(&server, alice.user_id, None, 30, 0).await;
    let since = rows[10].uploaded_at;

    let (status, page) = sync_page(
        &server,
        &alice,
        json!({
            "deviceId": device,
            "sinceTimestamp": since.format(&time::format_description::well_known::Rfc3339).unwrap(),
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    // Inclusive: rows 10..30 share or follow that second
    assert_eq!(page["photos"].as_array().unwrap().len(), 20);
}

#[tokio::test]
async fn test_fractional_since_excludes_earlier_second() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let device = server.create_device(alice.user_id, "phone").await;
    let rows = seed_photos(&server, alice.user_id, None, 30, 0).await;
    let since = rows[10].uploaded_at + Duration::milliseconds(500);

    let (status, page) = sync_page(
        &server,
        &alice,
        json!({
            "deviceId": device,
            "sinceTimestamp": since.format(&time::format_description::well_known::Rfc3339).unwrap(),
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    // Rows 10..20 were stored in the second the bound falls inside
    let returned: Vec<Uuid> = page["photos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().parse().unwrap())
        .collect();
    assert_eq!(returned, feed_order(&rows[20..]));
}

#[tokio::test]
async fn test_deleted_cursor_photo_does_not_wedge_feed() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let phone = server.create_device(alice.user_id, "phone").await;
    let tablet = server.create_device(alice.user_id, "tablet").await;
    let rows = seed_photos(&server, alice.user_id, None, 9, 0).await;
    let expected = feed_order(&rows);

    let (_, first) = sync_page(&server, &alice, json!({"deviceId": phone, "limit": 3})).await;
    let cursor = first["nextCursor"].as_str().unwrap().to_string();
    assert_eq!(cursor, expected[2].to_string());
    let (status, _) = json_request(
        &server.router,
        "DELETE",
        &format!("/photos/{cursor}"),
        None,
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let mut seen: Vec<Uuid> = first["photos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().parse().unwrap())
        .collect();
    let mut next = Some(cursor.clone());
    while let Some(cursor) = next {
        let (status, page) = sync_page(
            &server,
            &alice,
            json!({"deviceId": phone, "limit": 3, "cursor": cursor}),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{page}");
        seen.extend(
            page["photos"]
                .as_array()
                .unwrap()
                .iter()
                .map(|p| p["id"].as_str().unwrap().parse::<Uuid>().unwrap()),
        );
        next = page["nextCursor"].as_str().map(str::to_string);
    }
    assert_eq!(seen, expected);

    // Only the device that was served the row can resume from it
    let (status, body) = sync_page(
        &server,
        &alice,
        json!({"deviceId": tablet, "cursor": cursor}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");
}

#[tokio::test]
async fn test_bad_cursors_rejected() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let bob = server.create_user("bob").await;
    let device = server.create_device(alice.user_id, "phone").await;
    let bobs = seed_photos(&server, bob.user_id, None, 1, 0).await;

    for cursor in [
        json!("not-a-cursor"),
        json!(Uuid::new_v4().to_string()),
        json!(bobs[0].id.to_string()),
    ] {
        let (status, body) = sync_page(
            &server,
            &alice,
            json!({"deviceId": device, "cursor": cursor}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{cursor}");
        assert_eq!(body["code"], "invalid_argument");
    }

    // An empty cursor starts from the beginning
    let (status, _) = sync_page(&server, &alice, json!({"deviceId": device, "cursor": ""})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_limit_bounds() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let device = server.create_device(alice.user_id, "phone").await;

    for limit in [0, 501] {
        let (status, _) =
            sync_page(&server, &alice, json!({"deviceId": device, "limit": limit})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "limit {limit}");
    }
}

#[tokio::test]
async fn test_foreign_device_is_not_found() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let bob = server.create_user("bob").await;
    let bobs_device = server.create_device(bob.user_id, "Bob's phone").await;

    let (status, body) = sync_page(&server, &alice, json!({"deviceId": bobs_device})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "device not found");

    let (status, _) = json_request(
        &server.router,
        "GET",
        &format!("/sync/status?deviceId={bobs_device}"),
        None,
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_counts_and_last_sync() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let phone = server.create_device(alice.user_id, "phone").await;
    let tablet = server.create_device(alice.user_id, "tablet").await;
    seed_photos(&server, alice.user_id, Some(phone), 2, 0).await;
    seed_photos(&server, alice.user_id, Some(tablet), 3, 10).await;
    seed_photos(&server, alice.user_id, None, 4, 20).await;
    let status_uri = format!("/sync/status?deviceId={phone}");

    let (status, before) =
        json_request(&server.router, "GET", &status_uri, None, Some(&alice.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(before["totalPhotos"], 9);
    assert_eq!(before["thisDevicePhotos"], 2);
    assert_eq!(before["otherDevicePhotos"], 3);
    assert_eq!(before["legacyPhotos"], 4);
    assert!(before["lastSyncAt"].is_null());

    let (_, page) = sync_page(&server, &alice, json!({"deviceId": phone})).await;
    assert_eq!(page["syncVersion"], before["syncVersion"]);

    let (_, after) =
        json_request(&server.router, "GET", &status_uri, None, Some(&alice.token)).await;
    assert!(after["lastSyncAt"].is_string());

    let sync_state = server
        .metadata()
        .get_sync_state(phone)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sync_state.sync_version, before["syncVersion"].as_i64().unwrap());
}

#[tokio::test]
async fn test_sync_version_moves_with_catalog() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let device = server.create_device(alice.user_id, "phone").await;

    let (_, empty) = sync_page(&server, &alice, json!({"deviceId": device})).await;
    assert!(empty["photos"].as_array().unwrap().is_empty());
    assert_eq!(empty["hasMore"], false);

    seed_photos(&server, alice.user_id, None, 1, 0).await;
    let (_, after) = sync_page(&server, &alice, json!({"deviceId": device})).await;

    assert!(after["syncVersion"].as_i64().unwrap() > empty["syncVersion"].as_i64().unwrap());
}

#[tokio::test]
async fn test_legacy_listing_and_claim() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let device = server.create_device(alice.user_id, "phone").await;
    let legacy = seed_photos(&server, alice.user_id, None, 5, 0).await;
    seed_photos(&server, alice.user_id, Some(device), 2, 10).await;

    let (status, listed) = json_request(
        &server.router,
        "GET",
        "/sync/legacy-photos?limit=3",
        None,
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["total"], 5);
    assert_eq!(listed["photos"].as_array().unwrap().len(), 3);

    let picked = vec![legacy[0].id, legacy[1].id];
    let (status, claimed) = json_request(
        &server.router,
        "POST",
        "/sync/claim-legacy",
        Some(json!({"deviceId": device, "photoIds": picked})),
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(claimed["claimed"], 2);

    // Already attributed rows are left alone
    let (_, again) = json_request(
        &server.router,
        "POST",
        "/sync/claim-legacy",
        Some(json!({"deviceId": device, "photoIds": picked})),
        Some(&alice.token),
    )
    .await;
    assert_eq!(again["claimed"], 0);

    let (_, rest) = json_request(
        &server.router,
        "POST",
        "/sync/claim-legacy",
        Some(json!({"deviceId": device, "claimAll": true})),
        Some(&alice.token),
    )
    .await;
    assert_eq!(rest["claimed"], 3);

    let photo = server
        .metadata()
        .get_photo(legacy[4].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(photo.origin_device_id, Some(device));
    assert_eq!(
        server
            .metadata()
            .count_legacy_photos(alice.user_id)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_claim_legacy_argument_checks() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let bob = server.create_user("bob").await;
    let device = server.create_device(alice.user_id, "phone").await;
    let bobs_device = server.create_device(bob.user_id, "Bob's phone").await;
    let bobs = seed_photos(&server, bob.user_id, None, 1, 0).await;

    let (status, _) = json_request(
        &server.router,
        "POST",
        "/sync/claim-legacy",
        Some(json!({"deviceId": device})),
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = json_request(
        &server.router,
        "POST",
        "/sync/claim-legacy",
        Some(json!({"deviceId": bobs_device, "claimAll": true})),
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Other users' photos are never touched
    let (status, result) = json_request(
        &server.router,
        "POST",
        "/sync/claim-legacy",
        Some(json!({"deviceId": device, "photoIds": [bobs[0].id]})),
        Some(&alice.token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["claimed"], 0);
}
