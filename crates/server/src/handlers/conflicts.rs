//! Conflict registry endpoints (admin only).

use crate::auth::require_admin;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{PageQuery, parse_id, read_optional_json};
use crate::handlers::orphans::{NotesRequest, ResolutionResponse};
use crate::reconcile;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use photosync_core::{ConflictStatus, ConflictType};
use photosync_metadata::models::FileConflictRow;
use photosync_metadata::repos::ConflictFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Conflict row as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResponse {
    pub id: Uuid,
    pub photo_id: Uuid,
    pub file_path: String,
    #[serde(with = "time::serde::rfc3339")]
    pub discovered_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen_at: OffsetDateTime,
    pub conflict_type: String,
    pub db_photo_id: Option<Uuid>,
    pub db_user_id: Option<Uuid>,
    pub db_device_id: Option<Uuid>,
    pub file_photo_id: Option<Uuid>,
    pub file_user_id: Option<Uuid>,
    pub file_device_id: Option<Uuid>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub resolved_at: Option<OffsetDateTime>,
    pub resolved_by: Option<Uuid>,
    pub resolution_notes: Option<String>,
}

impl From<FileConflictRow> for ConflictResponse {
    fn from(row: FileConflictRow) -> Self {
        Self {
            id: row.id,
            photo_id: row.photo_id,
            file_path: row.file_path,
            discovered_at: row.discovered_at,
            last_seen_at: row.last_seen_at,
            conflict_type: row.conflict_type,
            db_photo_id: row.db_photo_id,
            db_user_id: row.db_user_id,
            db_device_id: row.db_device_id,
            file_photo_id: row.file_photo_id,
            file_user_id: row.file_user_id,
            file_device_id: row.file_device_id,
            status: row.status,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
            resolution_notes: row.resolution_notes,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictListResponse {
    pub conflicts: Vec<ConflictResponse>,
    pub total: i64,
    pub skip: u32,
    pub take: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictListQuery {
    pub status: Option<String>,
    pub conflict_type: Option<String>,
    pub skip: Option<u32>,
    pub take: Option<u32>,
}

impl ConflictListQuery {
    fn filter(&self) -> ApiResult<ConflictFilter> {
        let status = self
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| {
                ConflictStatus::parse(s)
                    .map_err(|_| ApiError::InvalidArgument(format!("invalid status: {s}")))
            })
            .transpose()?;
        let conflict_type = self
            .conflict_type
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| {
                ConflictType::parse(s)
                    .map_err(|_| ApiError::InvalidArgument(format!("invalid conflictType: {s}")))
            })
            .transpose()?;
        Ok(ConflictFilter {
            status,
            conflict_type,
        })
    }

    fn page(&self) -> PageQuery {
        PageQuery {
            skip: self.skip,
            take: self.take,
        }
    }
}

async fn list_with_filter(
    state: &AppState,
    filter: ConflictFilter,
    page: PageQuery,
) -> ApiResult<ConflictListResponse> {
    let (skip, take) = page.resolve()?;
    let conflicts = state.metadata.list_conflicts(filter, skip, take).await?;
    let total = state.metadata.count_conflicts(filter).await?;
    Ok(ConflictListResponse {
        conflicts: conflicts.into_iter().map(ConflictResponse::from).collect(),
        total,
        skip,
        take,
    })
}

/// GET /admin/conflicts
pub async fn list_conflicts(
    State(state): State<AppState>,
    Query(query): Query<ConflictListQuery>,
    req: Request,
) -> ApiResult<Json<ConflictListResponse>> {
    require_admin(&req)?;
    let filter = query.filter()?;
    Ok(Json(list_with_filter(&state, filter, query.page()).await?))
}

/// GET /admin/conflicts/pending
pub async fn list_pending_conflicts(
    State(state): State<AppState>,
    Query(query): Query<ConflictListQuery>,
    req: Request,
) -> ApiResult<Json<ConflictListResponse>> {
    require_admin(&req)?;
    let filter = ConflictFilter {
        status: Some(ConflictStatus::Pending),
        ..query.filter()?
    };
    Ok(Json(list_with_filter(&state, filter, query.page()).await?))
}

/// GET /admin/conflicts/{id}
pub async fn get_conflict(
    State(state): State<AppState>,
    Path(conflict_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ConflictResponse>> {
    require_admin(&req)?;
    let conflict_id = parse_id(&conflict_id, "conflict")?;
    let conflict = state
        .metadata
        .get_conflict(conflict_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("conflict {conflict_id} not found")))?;
    Ok(Json(conflict.into()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictStatsResponse {
    pub by_status: BTreeMap<String, i64>,
    /// Pending rows only.
    pub by_type: BTreeMap<String, i64>,
    pub pending: i64,
}

/// GET /admin/conflicts/stats
pub async fn conflict_stats(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<ConflictStatsResponse>> {
    require_admin(&req)?;
    let stats = state.metadata.conflict_stats().await?;

    let mut by_status: BTreeMap<String, i64> = ConflictStatus::all()
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    by_status.extend(stats.by_status);
    let mut by_type: BTreeMap<String, i64> = ConflictType::all()
        .iter()
        .map(|t| (t.as_str().to_string(), 0))
        .collect();
    by_type.extend(stats.by_type);

    let pending = by_status
        .get(ConflictStatus::Pending.as_str())
        .copied()
        .unwrap_or(0);
    Ok(Json(ConflictStatsResponse {
        by_status,
        by_type,
        pending,
    }))
}

/// POST /admin/conflicts/{id}/resolve-db - The catalog wins.
pub async fn resolve_with_db(
    State(state): State<AppState>,
    Path(conflict_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ResolutionResponse>> {
    let auth = require_admin(&req)?.clone();
    let conflict_id = parse_id(&conflict_id, "conflict")?;
    let body: NotesRequest = read_optional_json(req).await?;
    let updated =
        reconcile::resolve_with_db(&state, conflict_id, auth.user_id, body.notes.as_deref())
            .await?;
    Ok(Json(ResolutionResponse {
        id: conflict_id,
        updated,
    }))
}

/// POST /admin/conflicts/{id}/resolve-file - The file wins.
pub async fn resolve_with_file(
    State(state): State<AppState>,
    Path(conflict_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ResolutionResponse>> {
    let auth = require_admin(&req)?.clone();
    let conflict_id = parse_id(&conflict_id, "conflict")?;
    let body: NotesRequest = read_optional_json(req).await?;
    let updated =
        reconcile::resolve_with_file(&state, conflict_id, auth.user_id, body.notes.as_deref())
            .await?;
    Ok(Json(ResolutionResponse {
        id: conflict_id,
        updated,
    }))
}

/// POST /admin/conflicts/{id}/ignore
pub async fn ignore_conflict(
    State(state): State<AppState>,
    Path(conflict_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ResolutionResponse>> {
    let auth = require_admin(&req)?.clone();
    let conflict_id = parse_id(&conflict_id, "conflict")?;
    let body: NotesRequest = read_optional_json(req).await?;
    let updated =
        reconcile::ignore_conflict(&state, conflict_id, auth.user_id, body.notes.as_deref())
            .await?;
    Ok(Json(ResolutionResponse {
        id: conflict_id,
        updated,
    }))
}
