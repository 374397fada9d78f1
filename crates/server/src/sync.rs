//! Multi-device sync feed.
//!
//! The feed is ordered by `(uploaded_at, id)`. A cursor is the id of the last
//! delivered photo and is resolved back to its tuple on every call, so pages
//! never skip or repeat rows when other photos are inserted concurrently.

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{find_owned_device, require_owned_device};
use crate::metrics::SYNC_PAGES_SERVED;
use crate::state::AppState;
use photosync_core::{EmbeddedMetadata, SyncCursor, catalog_now, catalog_timestamp_ceil};
use photosync_metadata::models::{DeviceRow, PhotoRow, SyncPhotoRow};
use photosync_metadata::repos::FeedPosition;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Legacy listing size when the client does not ask for one.
pub const DEFAULT_LEGACY_LIMIT: u32 = 100;

/// Device the caller syncs as; other users' devices read as not found.
async fn sync_device(state: &AppState, auth: &AuthenticatedUser, device_id: Uuid) -> ApiResult<DeviceRow> {
    find_owned_device(state, auth.user_id, device_id)
        .await?
        .ok_or_else(|| ApiError::hidden("device"))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub device_id: Uuid,
    pub total_photos: i64,
    pub this_device_photos: i64,
    pub other_device_photos: i64,
    pub legacy_photos: i64,
    pub sync_version: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sync_at: Option<OffsetDateTime>,
}

pub async fn sync_status(
    state: &AppState,
    auth: &AuthenticatedUser,
    device_id: Uuid,
) -> ApiResult<SyncStatus> {
    let device = sync_device(state, auth, device_id).await?;
    let sync_state = state
        .metadata
        .ensure_sync_state(device.device_id, auth.user_id, catalog_now())
        .await?;
    let counts = state.metadata.sync_counts(auth.user_id, device.device_id).await?;
    let sync_version = state.metadata.catalog_version().await?;

    Ok(SyncStatus {
        device_id: device.device_id,
        total_photos: counts.total,
        this_device_photos: counts.this_device,
        other_device_photos: counts.other_devices,
        legacy_photos: counts.legacy,
        sync_version,
        last_sync_at: sync_state.last_sync_at,
    })
}

/// Body of `POST /sync/photos`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub device_id: Uuid,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub since_timestamp: Option<OffsetDateTime>,
}

/// One photo as delivered to a device.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem {
    pub id: Uuid,
    pub original_filename: String,
    pub content_hash: String,
    pub file_size: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub date_taken: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub origin_device_id: Option<Uuid>,
    pub origin_device_name: Option<String>,
    pub origin_platform: Option<String>,
    pub is_current_device: bool,
}

impl SyncItem {
    fn new(row: SyncPhotoRow, current_device: Uuid) -> Self {
        let SyncPhotoRow {
            photo,
            origin_device_name,
            origin_platform,
        } = row;
        Self {
            id: photo.id,
            original_filename: photo.original_filename,
            content_hash: photo.content_hash,
            file_size: photo.file_size,
            date_taken: photo.date_taken,
            uploaded_at: photo.uploaded_at,
            width: photo.width,
            height: photo.height,
            camera_make: photo.camera_make,
            camera_model: photo.camera_model,
            latitude: photo.latitude,
            longitude: photo.longitude,
            is_current_device: photo.origin_device_id == Some(current_device),
            origin_device_id: photo.origin_device_id,
            origin_device_name,
            origin_platform,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPage {
    pub photos: Vec<SyncItem>,
    /// Absent at the end of the stream.
    pub next_cursor: Option<String>,
    pub has_more: bool,
    pub sync_version: i64,
}

/// Resolve a cursor to its position in the feed.
///
/// The cursor must name one of the caller's photos. When that photo has been
/// deleted since it was served, the position recorded for the device's last
/// page stands in for it.
async fn feed_position(
    state: &AppState,
    user_id: Uuid,
    device_id: Uuid,
    cursor: Option<&str>,
) -> ApiResult<Option<FeedPosition>> {
    let Some(raw) = cursor else {
        return Ok(None);
    };
    let Some(cursor) = SyncCursor::decode(raw)
        .map_err(|e| ApiError::InvalidArgument(format!("invalid cursor: {e}")))?
    else {
        return Ok(None);
    };
    let unknown = || ApiError::InvalidArgument("cursor does not reference a known photo".to_string());

    if let Some(photo) = state.metadata.get_photo(cursor.photo_id()).await? {
        if photo.owner_user_id != Some(user_id) {
            return Err(unknown());
        }
        return Ok(Some(FeedPosition {
            uploaded_at: photo.uploaded_at,
            id: photo.id,
        }));
    }

    let sync_state = state
        .metadata
        .get_sync_state(device_id)
        .await?
        .filter(|s| s.user_id == user_id && s.last_sync_photo_id == Some(cursor.photo_id()));
    match sync_state.and_then(|s| s.last_sync_uploaded_at) {
        Some(uploaded_at) => {
            tracing::debug!(device_id = %device_id, cursor = %cursor.photo_id(), "Cursor photo deleted, resuming from recorded position");
            Ok(Some(FeedPosition {
                uploaded_at,
                id: cursor.photo_id(),
            }))
        }
        None => Err(unknown()),
    }
}

/// Serve one page of the feed and record it against the device.
pub async fn sync_photos(
    state: &AppState,
    auth: &AuthenticatedUser,
    request: SyncRequest,
) -> ApiResult<SyncPage> {
    let limit = request.limit.unwrap_or(state.config.sync.default_limit);
    let max_limit = state.config.sync.max_limit;
    if limit == 0 || limit > max_limit {
        return Err(ApiError::InvalidArgument(format!(
            "limit must be between 1 and {max_limit}"
        )));
    }

    let device = sync_device(state, auth, request.device_id).await?;
    let after = feed_position(
        state,
        auth.user_id,
        device.device_id,
        request.cursor.as_deref(),
    )
    .await?;
    let since = request.since_timestamp.map(catalog_timestamp_ceil);

    // Read before the page so the reported version never runs ahead of it.
    let sync_version = state.metadata.catalog_version().await?;
    let mut rows = state
        .metadata
        .sync_page(auth.user_id, after, since, limit + 1)
        .await?;
    let has_more = rows.len() > limit as usize;
    rows.truncate(limit as usize);

    let next_cursor = if has_more {
        rows.last()
            .map(|row| SyncCursor::after(row.photo.id).encode())
    } else {
        None
    };

    if let Some(last) = rows.last() {
        let now = catalog_now();
        state
            .metadata
            .ensure_sync_state(device.device_id, auth.user_id, now)
            .await?;
        state
            .metadata
            .record_sync(
                device.device_id,
                now,
                FeedPosition {
                    uploaded_at: last.photo.uploaded_at,
                    id: last.photo.id,
                },
                sync_version,
            )
            .await?;
    }
    if let Err(e) = state.metadata.touch_device(device.device_id, catalog_now()).await {
        tracing::debug!(device_id = %device.device_id, error = %e, "Failed to touch device");
    }

    SYNC_PAGES_SERVED.inc();
    tracing::debug!(
        user_id = %auth.user_id,
        device_id = %device.device_id,
        returned = rows.len(),
        has_more,
        "Sync page served"
    );

    Ok(SyncPage {
        photos: rows
            .into_iter()
            .map(|row| SyncItem::new(row, device.device_id))
            .collect(),
        next_cursor,
        has_more,
        sync_version,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPhoto {
    pub id: Uuid,
    pub original_filename: String,
    pub content_hash: String,
    pub file_size: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub date_taken: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
}

impl From<PhotoRow> for LegacyPhoto {
    fn from(photo: PhotoRow) -> Self {
        Self {
            id: photo.id,
            original_filename: photo.original_filename,
            content_hash: photo.content_hash,
            file_size: photo.file_size,
            date_taken: photo.date_taken,
            uploaded_at: photo.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPhotos {
    pub photos: Vec<LegacyPhoto>,
    pub total: i64,
}

/// Photos with no origin device, oldest first.
pub async fn legacy_photos(
    state: &AppState,
    auth: &AuthenticatedUser,
    limit: Option<u32>,
) -> ApiResult<LegacyPhotos> {
    let max_limit = state.config.sync.legacy_max_limit;
    let limit = limit.unwrap_or(DEFAULT_LEGACY_LIMIT.min(max_limit));
    if limit == 0 || limit > max_limit {
        return Err(ApiError::InvalidArgument(format!(
            "limit must be between 1 and {max_limit}"
        )));
    }

    let photos = state.metadata.legacy_photos(auth.user_id, limit).await?;
    let total = state.metadata.count_legacy_photos(auth.user_id).await?;
    Ok(LegacyPhotos {
        photos: photos.into_iter().map(LegacyPhoto::from).collect(),
        total,
    })
}

/// Body of `POST /sync/claim-legacy`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimLegacyRequest {
    pub device_id: Uuid,
    #[serde(default)]
    pub claim_all: bool,
    #[serde(default)]
    pub photo_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimLegacyResult {
    /// Photos that changed in this call; already attributed rows are not counted.
    pub claimed: usize,
    pub photo_ids: Vec<Uuid>,
}

/// Attribute legacy photos to one of the caller's devices.
pub async fn claim_legacy(
    state: &AppState,
    auth: &AuthenticatedUser,
    request: ClaimLegacyRequest,
) -> ApiResult<ClaimLegacyResult> {
    if !request.claim_all && request.photo_ids.is_empty() {
        return Err(ApiError::InvalidArgument(
            "either claimAll or a non-empty photoIds list is required".to_string(),
        ));
    }
    let device = require_owned_device(state, auth.user_id, request.device_id).await?;

    let targets = (!request.claim_all).then_some(request.photo_ids.as_slice());
    let claimed = state
        .metadata
        .claim_legacy(auth.user_id, device.device_id, targets, catalog_now())
        .await?;

    tracing::info!(
        user_id = %auth.user_id,
        device_id = %device.device_id,
        claimed = claimed.len(),
        "Legacy photos claimed"
    );
    if !claimed.is_empty() {
        spawn_reembed(state, claimed.clone());
    }

    Ok(ClaimLegacyResult {
        claimed: claimed.len(),
        photo_ids: claimed,
    })
}

/// Rewrite the sidecars of photos whose ownership changed, in the background.
fn spawn_reembed(state: &AppState, photo_ids: Vec<Uuid>) {
    let state = state.clone();
    tokio::spawn(async move {
        for photo_id in photo_ids {
            let photo = match state.metadata.get_photo(photo_id).await {
                Ok(Some(photo)) => photo,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(photo_id = %photo_id, error = %e, "Failed to load photo for sidecar update");
                    continue;
                }
            };
            let record = EmbeddedMetadata::from_catalog(
                &photo.ownership(),
                &photo.content_hash,
                photo.uploaded_at,
            );
            if let Err(e) = state.codec.write(&photo.stored_path, &record).await {
                tracing::warn!(photo_id = %photo_id, error = %e, "Failed to update sidecar");
            }
        }
    });
}
