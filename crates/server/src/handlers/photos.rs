//! Photo catalog endpoints.

use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{PageQuery, parse_id, read_json, visible_photo};
use crate::ingest::{self, HashPartition, UploadParams, UploadResponse};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use photosync_core::ThumbnailSize;
use photosync_metadata::models::PhotoRow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Catalog record as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoResponse {
    pub id: Uuid,
    pub owner_user_id: Option<Uuid>,
    pub origin_device_id: Option<Uuid>,
    pub original_filename: String,
    pub stored_path: String,
    pub content_hash: String,
    pub file_size: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub date_taken: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub has_thumbnails: bool,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl From<PhotoRow> for PhotoResponse {
    fn from(row: PhotoRow) -> Self {
        Self {
            has_thumbnails: row.has_all_thumbnails(),
            id: row.id,
            owner_user_id: row.owner_user_id,
            origin_device_id: row.origin_device_id,
            original_filename: row.original_filename,
            stored_path: row.stored_path,
            content_hash: row.content_hash,
            file_size: row.file_size,
            date_taken: row.date_taken,
            uploaded_at: row.uploaded_at,
            width: row.width,
            height: row.height,
            camera_make: row.camera_make,
            camera_model: row.camera_model,
            latitude: row.latitude,
            longitude: row.longitude,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoListResponse {
    pub photos: Vec<PhotoResponse>,
    pub total: i64,
    pub skip: u32,
    pub take: u32,
}

/// POST /photos - Upload raw photo bytes.
///
/// Returns 201 for new content and 200 when the bytes were already stored.
pub async fn upload_photo(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    req: Request,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let auth = require_auth(&req)?.clone();
    let body = axum::body::to_bytes(req.into_body(), state.config.server.max_upload_bytes)
        .await
        .map_err(|e| ApiError::InvalidArgument(format!("failed to read body: {e}")))?;

    let response = ingest::upload_photo(&state, &auth, params, body).await?;
    let status = if response.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(response)))
}

#[derive(Debug, Deserialize)]
pub struct CheckHashesRequest {
    pub hashes: Vec<String>,
}

/// POST /photos/check - Which of these hashes are already stored.
pub async fn check_hashes(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<HashPartition>> {
    require_auth(&req)?;
    let body: CheckHashesRequest = read_json(req).await?;
    Ok(Json(ingest::check_hashes(&state, &body.hashes).await?))
}

/// GET /photos - The caller's photos, newest first.
pub async fn list_photos(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    req: Request,
) -> ApiResult<Json<PhotoListResponse>> {
    let auth = require_auth(&req)?.clone();
    let (skip, take) = page.resolve()?;

    let photos = state
        .metadata
        .list_photos_for_user(auth.user_id, skip, take)
        .await?;
    let total = state.metadata.count_photos_for_user(auth.user_id).await?;

    Ok(Json(PhotoListResponse {
        photos: photos.into_iter().map(PhotoResponse::from).collect(),
        total,
        skip,
        take,
    }))
}

/// GET /photos/{id}
pub async fn get_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<String>,
    req: Request,
) -> ApiResult<Json<PhotoResponse>> {
    let auth = require_auth(&req)?.clone();
    let photo_id = parse_id(&photo_id, "photo")?;
    let photo = visible_photo(&state, &auth, photo_id).await?;
    Ok(Json(photo.into()))
}

fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "tif" | "tiff" => "image/tiff",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

/// Stream a stored blob.
async fn stream_blob(state: &AppState, key: &str, content_type: &'static str) -> ApiResult<Response> {
    let meta = state.storage.head(key).await?;
    let stream = state
        .storage
        .get_stream(key)
        .await?
        .map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, content_type.to_string()),
            (CONTENT_LENGTH, meta.size.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// GET /photos/{id}/file - Original bytes.
pub async fn get_photo_file(
    State(state): State<AppState>,
    Path(photo_id): Path<String>,
    req: Request,
) -> ApiResult<Response> {
    let auth = require_auth(&req)?.clone();
    let photo_id = parse_id(&photo_id, "photo")?;
    let photo = visible_photo(&state, &auth, photo_id).await?;
    stream_blob(
        &state,
        &photo.stored_path,
        content_type_for(&photo.original_filename),
    )
    .await
}

/// GET /photos/{id}/thumbnail/{size}
pub async fn get_photo_thumbnail(
    State(state): State<AppState>,
    Path((photo_id, size)): Path<(String, String)>,
    req: Request,
) -> ApiResult<Response> {
    let auth = require_auth(&req)?.clone();
    let photo_id = parse_id(&photo_id, "photo")?;
    let size = ThumbnailSize::parse(&size)
        .map_err(|_| ApiError::InvalidArgument(format!("invalid thumbnail size: {size}")))?;
    let photo = visible_photo(&state, &auth, photo_id).await?;

    let key = match size {
        ThumbnailSize::Small => photo.thumbnail_small,
        ThumbnailSize::Medium => photo.thumbnail_medium,
        ThumbnailSize::Large => photo.thumbnail_large,
    }
    .ok_or_else(|| ApiError::NotFound(format!("{size} thumbnail not generated")))?;

    stream_blob(&state, &key, "image/jpeg").await
}

/// DELETE /photos/{id}
pub async fn delete_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let auth = require_auth(&req)?.clone();
    let photo_id = parse_id(&photo_id, "photo")?;
    visible_photo(&state, &auth, photo_id).await?;
    ingest::delete_photo(&state, photo_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
