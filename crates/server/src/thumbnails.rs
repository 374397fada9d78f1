//! Thumbnail regeneration and backfill.
//!
//! Thumbnails are advisory: every caller outside the backfill endpoint logs
//! failures and carries on.

use crate::error::ApiResult;
use crate::state::AppState;
use bytes::Bytes;
use photosync_core::catalog_now;
use photosync_metadata::models::{PhotoRow, ThumbnailUpdate};
use photosync_storage::ThumbnailSet;
use serde::Serialize;
use uuid::Uuid;

/// Generate every variant for `photo` and record them in the catalog.
///
/// `source` avoids a second read when the caller already holds the bytes.
pub async fn regenerate(
    state: &AppState,
    photo: &PhotoRow,
    source: Option<Bytes>,
) -> ApiResult<ThumbnailSet> {
    let source = match source {
        Some(bytes) => bytes,
        None => state.storage.get(&photo.stored_path).await?,
    };
    let set = state.thumbnailer.generate(photo.id, source).await?;
    let update = ThumbnailUpdate {
        small: Some(set.small.clone()),
        medium: Some(set.medium.clone()),
        large: Some(set.large.clone()),
        width: Some(i64::from(set.width)),
        height: Some(i64::from(set.height)),
    };
    state
        .metadata
        .set_thumbnails(photo.id, &update, catalog_now())
        .await?;
    Ok(set)
}

/// Regenerate in the background, logging failures.
pub fn spawn_regenerate(state: &AppState, photo: PhotoRow, source: Option<Bytes>) {
    if !state.config.thumbnails.enabled {
        return;
    }
    let state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = regenerate(&state, &photo, source).await {
            tracing::warn!(photo_id = %photo.id, error = %e, "Thumbnail generation failed");
        }
    });
}

/// Remove stored thumbnails, logging failures.
pub async fn remove_quietly(state: &AppState, photo_id: Uuid) {
    if let Err(e) = state.thumbnailer.remove(photo_id).await {
        tracing::warn!(photo_id = %photo_id, error = %e, "Failed to remove thumbnails");
    }
}

/// Outcome of one backfill batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub selected: u64,
    pub generated: u64,
    pub failed: u64,
}

/// Regenerate thumbnails for up to `limit` photos that are missing some.
pub async fn backfill(state: &AppState, limit: u32) -> ApiResult<BackfillReport> {
    let photos = state.metadata.list_photos_missing_thumbnails(limit).await?;
    let mut report = BackfillReport {
        selected: photos.len() as u64,
        ..Default::default()
    };

    for photo in photos {
        match regenerate(state, &photo, None).await {
            Ok(_) => report.generated += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(photo_id = %photo.id, error = %e, "Thumbnail backfill failed for photo");
            }
        }
    }

    tracing::info!(
        selected = report.selected,
        generated = report.generated,
        failed = report.failed,
        "Thumbnail backfill batch finished"
    );
    Ok(report)
}
