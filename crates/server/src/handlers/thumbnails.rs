//! Thumbnail maintenance.

use crate::auth::require_admin;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::thumbnails;
use axum::Json;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use photosync_core::config::MAX_BACKFILL_BATCH;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct BackfillQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct BackfillResponse {
    /// Upper bound on photos the background job will process.
    pub limit: u32,
}

/// POST /admin/thumbnails/backfill?limit=N - Regenerate missing thumbnails
/// in the background.
pub async fn backfill_thumbnails(
    State(state): State<AppState>,
    Query(query): Query<BackfillQuery>,
    req: Request,
) -> ApiResult<(StatusCode, Json<BackfillResponse>)> {
    let auth = require_admin(&req)?;
    if !state.config.thumbnails.enabled {
        return Err(ApiError::Conflict("thumbnail generation is disabled".to_string()));
    }
    let limit = query
        .limit
        .unwrap_or(state.config.thumbnails.backfill_batch_size);
    if limit == 0 || limit > MAX_BACKFILL_BATCH {
        return Err(ApiError::InvalidArgument(format!(
            "limit must be between 1 and {MAX_BACKFILL_BATCH}"
        )));
    }

    tracing::info!(limit, requested_by = %auth.user_id, "Thumbnail backfill requested");
    let job_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = thumbnails::backfill(&job_state, limit).await {
            tracing::warn!(error = %e, "Thumbnail backfill failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(BackfillResponse { limit })))
}
