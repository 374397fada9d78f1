//! Device sync endpoints.

use crate::auth::require_auth;
use crate::error::ApiResult;
use crate::handlers::common::read_json;
use crate::state::AppState;
use crate::sync::{
    self, ClaimLegacyRequest, ClaimLegacyResult, LegacyPhotos, SyncPage, SyncRequest, SyncStatus,
};
use axum::Json;
use axum::extract::{Query, Request, State};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusQuery {
    pub device_id: Uuid,
}

/// GET /sync/status?deviceId=..
pub async fn sync_status(
    State(state): State<AppState>,
    Query(query): Query<SyncStatusQuery>,
    req: Request,
) -> ApiResult<Json<SyncStatus>> {
    let auth = require_auth(&req)?.clone();
    Ok(Json(sync::sync_status(&state, &auth, query.device_id).await?))
}

/// POST /sync/photos - Next page of the feed.
pub async fn sync_photos(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<SyncPage>> {
    let auth = require_auth(&req)?.clone();
    let body: SyncRequest = read_json(req).await?;
    Ok(Json(sync::sync_photos(&state, &auth, body).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct LegacyQuery {
    pub limit: Option<u32>,
}

/// GET /sync/legacy-photos?limit=..
pub async fn legacy_photos(
    State(state): State<AppState>,
    Query(query): Query<LegacyQuery>,
    req: Request,
) -> ApiResult<Json<LegacyPhotos>> {
    let auth = require_auth(&req)?.clone();
    Ok(Json(sync::legacy_photos(&state, &auth, query.limit).await?))
}

/// POST /sync/claim-legacy
pub async fn claim_legacy(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<ClaimLegacyResult>> {
    let auth = require_auth(&req)?.clone();
    let body: ClaimLegacyRequest = read_json(req).await?;
    Ok(Json(sync::claim_legacy(&state, &auth, body).await?))
}
