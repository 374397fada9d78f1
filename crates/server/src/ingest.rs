//! Upload path and content-hash deduplication.
//!
//! Content is hashed before anything is written, so the same bytes are never
//! stored twice. New files are staged under a reserved temp key, recorded in
//! the catalog, and only then renamed into place. The rename never
//! overwrites an existing file.

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::require_owned_device;
use crate::metrics::{BYTES_STORED, DUPLICATE_UPLOADS, PHOTOS_UPLOADED};
use crate::state::AppState;
use crate::thumbnails;
use bytes::Bytes;
use photosync_core::hash::normalize_hex;
use photosync_core::layout::{
    TEMP_MARKER, device_photo_key, sanitize_filename, sidecar_key, user_photo_key,
    with_collision_suffix,
};
use photosync_core::{ContentHash, EmbeddedMetadata, MAX_HASH_BATCH, catalog_now, catalog_timestamp};
use photosync_metadata::models::PhotoRow;
use photosync_storage::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Query parameters accompanying an upload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadParams {
    pub filename: Option<String>,
    pub device_id: Option<Uuid>,
    /// RFC 3339.
    pub date_taken: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Upload result; `duplicate` is set when the content was already stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: Uuid,
    pub stored_path: String,
    pub content_hash: String,
    pub file_size: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
    pub duplicate: bool,
}

impl UploadResponse {
    fn from_photo(photo: &PhotoRow, duplicate: bool) -> Self {
        Self {
            id: photo.id,
            stored_path: photo.stored_path.clone(),
            content_hash: photo.content_hash.clone(),
            file_size: photo.file_size,
            uploaded_at: photo.uploaded_at,
            duplicate,
        }
    }
}

fn parse_timestamp(raw: &str, field: &str) -> ApiResult<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|e| ApiError::InvalidArgument(format!("{field} must be RFC 3339: {e}")))
}

/// Store `body` as a new photo, or return the photo already holding it.
pub async fn upload_photo(
    state: &AppState,
    auth: &AuthenticatedUser,
    params: UploadParams,
    body: Bytes,
) -> ApiResult<UploadResponse> {
    if body.is_empty() {
        return Err(ApiError::InvalidArgument("upload body is empty".to_string()));
    }

    let content_hash = ContentHash::compute(&body).to_hex();
    if let Some(existing) = state.metadata.get_photo_by_hash(&content_hash).await? {
        DUPLICATE_UPLOADS.inc();
        tracing::debug!(
            photo_id = %existing.id,
            content_hash = %content_hash,
            "Upload matched existing content"
        );
        return Ok(UploadResponse::from_photo(&existing, true));
    }

    let device = match params.device_id {
        Some(device_id) => Some(require_owned_device(state, auth.user_id, device_id).await?),
        None => None,
    };

    let now = catalog_now();
    let date_taken = match params.date_taken.as_deref() {
        Some(raw) => catalog_timestamp(parse_timestamp(raw, "dateTaken")?),
        None => now,
    };
    let original_filename = sanitize_filename(params.filename.as_deref().unwrap_or("photo.jpg"));
    let photo_id = Uuid::new_v4();
    let key = match &device {
        Some(device) => device_photo_key(&device.device_name, date_taken, &original_filename),
        None => user_photo_key(auth.user_id, date_taken, &original_filename),
    };

    let staging = format!("{key}{TEMP_MARKER}{}", photo_id.simple());
    state.storage.put(&staging, body.clone()).await?;

    let mut photo = PhotoRow {
        id: photo_id,
        owner_user_id: Some(auth.user_id),
        origin_device_id: device.as_ref().map(|d| d.device_id),
        original_filename,
        stored_path: String::new(),
        content_hash: content_hash.clone(),
        file_size: body.len() as i64,
        date_taken,
        uploaded_at: now,
        width: None,
        height: None,
        thumbnail_small: None,
        thumbnail_medium: None,
        thumbnail_large: None,
        camera_make: params.camera_make,
        camera_model: params.camera_model,
        latitude: params.latitude,
        longitude: params.longitude,
        updated_at: now,
    };

    // The row goes in before the file is visible at its final key, so a
    // concurrent sweep never mistakes a fresh upload for an orphan.
    let alternate = with_collision_suffix(&key, photo_id);
    photo.stored_path = match free_key(state, &key, photo_id).await {
        Ok(stored_path) => stored_path,
        Err(e) => {
            discard_staging(state, &staging).await;
            return Err(e);
        }
    };
    loop {
        match state.metadata.insert_photo(&photo).await {
            Ok(()) => break,
            Err(e) if e.is_unique_violation(None) => {
                if let Some(existing) = state.metadata.get_photo_by_hash(&content_hash).await? {
                    // A concurrent upload of the same content won.
                    discard_staging(state, &staging).await;
                    DUPLICATE_UPLOADS.inc();
                    return Ok(UploadResponse::from_photo(&existing, true));
                }
                if photo.stored_path != alternate {
                    // A concurrent upload took the same name.
                    photo.stored_path = alternate.clone();
                    continue;
                }
                discard_staging(state, &staging).await;
                return Err(e.into());
            }
            Err(e) => {
                discard_staging(state, &staging).await;
                return Err(e.into());
            }
        }
    }

    match rename_into_place(state, photo.id, &staging, &photo.stored_path).await {
        Ok(stored_path) => photo.stored_path = stored_path,
        Err(e) => {
            discard_staging(state, &staging).await;
            forget_photo(state, photo.id).await;
            return Err(e);
        }
    }

    let stored_path = photo.stored_path.clone();
    let record = EmbeddedMetadata::from_catalog(&photo.ownership(), &content_hash, now);
    if let Err(e) = state.codec.write(&stored_path, &record).await {
        discard_blob(state, &stored_path).await;
        forget_photo(state, photo.id).await;
        return Err(e.into());
    }

    PHOTOS_UPLOADED.inc();
    BYTES_STORED.inc_by(body.len() as u64);
    tracing::info!(
        photo_id = %photo.id,
        user_id = %auth.user_id,
        stored_path = %stored_path,
        size = body.len(),
        "Photo stored"
    );

    if let Some(device) = &device
        && let Err(e) = state.metadata.touch_device(device.device_id, now).await
    {
        tracing::debug!(device_id = %device.device_id, error = %e, "Failed to touch device");
    }

    let response = UploadResponse::from_photo(&photo, false);
    thumbnails::spawn_regenerate(state, photo, Some(body));
    Ok(response)
}

/// `key` if nothing occupies it, else its collision-suffixed variant.
///
/// A key is occupied when a catalog row points at it, or a file or sidecar
/// already sits there.
pub async fn free_key(state: &AppState, key: &str, photo_id: Uuid) -> ApiResult<String> {
    let taken = state.metadata.get_photo_by_path(key).await?.is_some()
        || state.storage.exists(key).await?
        || state.storage.exists(&sidecar_key(key)).await?;
    if taken {
        Ok(with_collision_suffix(key, photo_id))
    } else {
        Ok(key.to_string())
    }
}

/// Rename `from` to `to` for a photo whose catalog row already points at `to`.
///
/// When a file appeared at `to` in the meantime, the row is repointed at the
/// collision-suffixed key first and the file goes there instead. Returns the
/// key actually used.
pub async fn rename_into_place(
    state: &AppState,
    photo_id: Uuid,
    from: &str,
    to: &str,
) -> ApiResult<String> {
    let alternate = with_collision_suffix(to, photo_id);
    match state.storage.rename(from, to).await {
        Ok(()) => Ok(to.to_string()),
        Err(StorageError::AlreadyExists(_)) if to != alternate => {
            state
                .metadata
                .update_photo_path(photo_id, &alternate, catalog_now())
                .await?;
            state.storage.rename(from, &alternate).await?;
            Ok(alternate)
        }
        Err(e) => Err(e.into()),
    }
}

async fn discard_staging(state: &AppState, staging: &str) {
    if let Err(e) = state.storage.delete(staging).await {
        tracing::warn!(key = %staging, error = %e, "Failed to remove staged upload");
    }
}

async fn forget_photo(state: &AppState, photo_id: Uuid) {
    if let Err(e) = state.metadata.delete_photo(photo_id).await {
        tracing::warn!(photo_id = %photo_id, error = %e, "Failed to remove catalog row after failed upload");
    }
}

async fn discard_blob(state: &AppState, key: &str) {
    if let Err(e) = state.storage.delete(key).await {
        tracing::warn!(key = %key, error = %e, "Failed to remove stored file after failed upload");
    }
    if let Err(e) = state.codec.remove(key).await {
        tracing::warn!(key = %key, error = %e, "Failed to remove sidecar after failed upload");
    }
}

/// Partition of a hash batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HashPartition {
    pub existing: Vec<String>,
    pub missing: Vec<String>,
}

/// Split `hashes` into those already stored and those that are not.
///
/// Input is case-normalized and de-duplicated, keeping first-seen order.
pub async fn check_hashes(state: &AppState, hashes: &[String]) -> ApiResult<HashPartition> {
    if hashes.is_empty() || hashes.len() > MAX_HASH_BATCH {
        return Err(ApiError::InvalidArgument(format!(
            "hashes must contain between 1 and {MAX_HASH_BATCH} entries"
        )));
    }

    let mut seen = HashSet::with_capacity(hashes.len());
    let normalized: Vec<String> = hashes
        .iter()
        .map(|h| normalize_hex(h))
        .filter(|h| seen.insert(h.clone()))
        .collect();

    let stored: HashSet<String> = state
        .metadata
        .existing_hashes(&normalized)
        .await?
        .into_iter()
        .collect();

    let (existing, missing) = normalized.into_iter().partition(|h| stored.contains(h));
    Ok(HashPartition { existing, missing })
}

/// Delete a photo row, then its file, sidecar and thumbnails.
///
/// File removal failures are logged; the catalog row is what counts.
pub async fn delete_photo(state: &AppState, photo_id: Uuid) -> ApiResult<PhotoRow> {
    let photo = state
        .metadata
        .delete_photo(photo_id)
        .await?
        .ok_or_else(|| ApiError::hidden("photo"))?;

    match state.storage.delete(&photo.stored_path).await {
        Ok(()) | Err(StorageError::NotFound(_)) => {}
        Err(e) => {
            tracing::warn!(photo_id = %photo.id, key = %photo.stored_path, error = %e, "Failed to delete photo file");
        }
    }
    if let Err(e) = state.codec.remove(&photo.stored_path).await {
        tracing::warn!(
            photo_id = %photo.id,
            key = %sidecar_key(&photo.stored_path),
            error = %e,
            "Failed to delete sidecar"
        );
    }
    thumbnails::remove_quietly(state, photo.id).await;

    tracing::info!(photo_id = %photo.id, "Photo deleted");
    Ok(photo)
}
