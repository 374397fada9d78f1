//! Orphan registry endpoints.
//!
//! `/admin/orphans` sees every row. `/web/orphans` is scoped to the caller:
//! rows assigned to them, or unassigned rows whose embedded owner is them.

use crate::auth::{require_admin, require_auth};
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{PageQuery, parse_id, read_json, read_optional_json};
use crate::reconcile::{self, BulkResult, ClaimOutcome, ClaimTarget, orphan_visible_to};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use photosync_core::OrphanStatus;
use photosync_metadata::models::OrphanFileRow;
use photosync_metadata::repos::{OrphanAssignment, OrphanFilter};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Orphan row as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanResponse {
    pub id: Uuid,
    pub file_path: String,
    pub file_size: i64,
    pub file_hash: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub discovered_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen_at: OffsetDateTime,
    pub embedded_photo_id: Option<Uuid>,
    pub embedded_user_id: Option<Uuid>,
    pub embedded_device_id: Option<Uuid>,
    pub embedded_file_hash: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub embedded_uploaded_at: Option<OffsetDateTime>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub status_changed_at: Option<OffsetDateTime>,
    pub status_changed_by: Option<Uuid>,
    pub assigned_to_user: Option<Uuid>,
    pub assigned_to_device: Option<Uuid>,
    pub claimed_photo_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl From<OrphanFileRow> for OrphanResponse {
    fn from(row: OrphanFileRow) -> Self {
        Self {
            id: row.id,
            file_path: row.file_path,
            file_size: row.file_size,
            file_hash: row.file_hash,
            discovered_at: row.discovered_at,
            last_seen_at: row.last_seen_at,
            embedded_photo_id: row.embedded_photo_id,
            embedded_user_id: row.embedded_user_id,
            embedded_device_id: row.embedded_device_id,
            embedded_file_hash: row.embedded_file_hash,
            embedded_uploaded_at: row.embedded_uploaded_at,
            status: row.status,
            status_changed_at: row.status_changed_at,
            status_changed_by: row.status_changed_by,
            assigned_to_user: row.assigned_to_user,
            assigned_to_device: row.assigned_to_device,
            claimed_photo_id: row.claimed_photo_id,
            notes: row.notes,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanListResponse {
    pub orphans: Vec<OrphanResponse>,
    pub total: i64,
    pub skip: u32,
    pub take: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrphanListQuery {
    pub status: Option<String>,
    pub skip: Option<u32>,
    pub take: Option<u32>,
}

impl OrphanListQuery {
    fn status(&self) -> ApiResult<Option<OrphanStatus>> {
        self.status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| {
                OrphanStatus::parse(s)
                    .map_err(|_| ApiError::InvalidArgument(format!("invalid status: {s}")))
            })
            .transpose()
    }

    fn page(&self) -> PageQuery {
        PageQuery {
            skip: self.skip,
            take: self.take,
        }
    }
}

/// Outcome of a single-row resolution.
#[derive(Debug, Serialize)]
pub struct ResolutionResponse {
    pub id: Uuid,
    /// False when the row had already left the state this call expected.
    pub updated: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotesRequest {
    pub notes: Option<String>,
}

async fn list_with_filter(
    state: &AppState,
    filter: OrphanFilter,
    page: PageQuery,
) -> ApiResult<OrphanListResponse> {
    let (skip, take) = page.resolve()?;
    let orphans = state.metadata.list_orphans(filter, skip, take).await?;
    let total = state.metadata.count_orphans(filter).await?;
    Ok(OrphanListResponse {
        orphans: orphans.into_iter().map(OrphanResponse::from).collect(),
        total,
        skip,
        take,
    })
}

// =============================================================================
// Admin
// =============================================================================

/// GET /admin/orphans
pub async fn list_orphans(
    State(state): State<AppState>,
    Query(query): Query<OrphanListQuery>,
    req: Request,
) -> ApiResult<Json<OrphanListResponse>> {
    require_admin(&req)?;
    let filter = OrphanFilter {
        status: query.status()?,
        ..Default::default()
    };
    Ok(Json(list_with_filter(&state, filter, query.page()).await?))
}

/// GET /admin/orphans/unassigned - Pending rows nobody has been assigned to.
pub async fn list_unassigned_orphans(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    req: Request,
) -> ApiResult<Json<OrphanListResponse>> {
    require_admin(&req)?;
    let filter = OrphanFilter {
        status: Some(OrphanStatus::Pending),
        unassigned_only: true,
        visible_to: None,
    };
    Ok(Json(list_with_filter(&state, filter, page).await?))
}

/// GET /admin/orphans/{id}
pub async fn get_orphan(
    State(state): State<AppState>,
    Path(orphan_id): Path<String>,
    req: Request,
) -> ApiResult<Json<OrphanResponse>> {
    require_admin(&req)?;
    let orphan_id = parse_id(&orphan_id, "orphan")?;
    let orphan = state
        .metadata
        .get_orphan(orphan_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("orphan {orphan_id} not found")))?;
    Ok(Json(orphan.into()))
}

/// POST /admin/orphans/{id}/claim
pub async fn admin_claim_orphan(
    State(state): State<AppState>,
    Path(orphan_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ClaimOutcome>> {
    let auth = require_admin(&req)?.clone();
    let orphan_id = parse_id(&orphan_id, "orphan")?;
    let target: ClaimTarget = read_optional_json(req).await?;
    Ok(Json(
        reconcile::claim_orphan(&state, orphan_id, target, auth.user_id).await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub user_id: Option<Uuid>,
    pub device_id: Option<Uuid>,
}

impl AssignRequest {
    fn assignment(&self) -> OrphanAssignment {
        OrphanAssignment {
            user_id: self.user_id,
            device_id: self.device_id,
        }
    }
}

/// POST /admin/orphans/{id}/assign
pub async fn assign_orphan(
    State(state): State<AppState>,
    Path(orphan_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ResolutionResponse>> {
    let auth = require_admin(&req)?.clone();
    let orphan_id = parse_id(&orphan_id, "orphan")?;
    let body: AssignRequest = read_json(req).await?;
    let updated =
        reconcile::assign_orphan(&state, orphan_id, body.assignment(), auth.user_id).await?;
    Ok(Json(ResolutionResponse {
        id: orphan_id,
        updated,
    }))
}

/// POST /admin/orphans/{id}/ignore
pub async fn admin_ignore_orphan(
    State(state): State<AppState>,
    Path(orphan_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ResolutionResponse>> {
    let auth = require_admin(&req)?.clone();
    let orphan_id = parse_id(&orphan_id, "orphan")?;
    let body: NotesRequest = read_optional_json(req).await?;
    let updated =
        reconcile::ignore_orphan(&state, orphan_id, auth.user_id, body.notes.as_deref()).await?;
    Ok(Json(ResolutionResponse {
        id: orphan_id,
        updated,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkClaimRequest {
    pub ids: Vec<Uuid>,
    pub user_id: Option<Uuid>,
    pub device_id: Option<Uuid>,
}

/// POST /admin/orphans/bulk-claim
pub async fn bulk_claim_orphans(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<BulkResult>> {
    let auth = require_admin(&req)?.clone();
    let body: BulkClaimRequest = read_json(req).await?;
    let target = ClaimTarget {
        user_id: body.user_id,
        device_id: body.device_id,
    };
    Ok(Json(
        reconcile::bulk_claim(&state, &body.ids, target, auth.user_id).await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAssignRequest {
    pub ids: Vec<Uuid>,
    pub user_id: Option<Uuid>,
    pub device_id: Option<Uuid>,
}

/// POST /admin/orphans/bulk-assign
pub async fn bulk_assign_orphans(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<BulkResult>> {
    let auth = require_admin(&req)?.clone();
    let body: BulkAssignRequest = read_json(req).await?;
    let assignment = OrphanAssignment {
        user_id: body.user_id,
        device_id: body.device_id,
    };
    Ok(Json(
        reconcile::bulk_assign(&state, &body.ids, assignment, auth.user_id).await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteRequest {
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub delete_files: bool,
}

/// POST /admin/orphans/bulk-delete
pub async fn bulk_delete_orphans(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<BulkResult>> {
    let auth = require_admin(&req)?.clone();
    let body: BulkDeleteRequest = read_json(req).await?;
    let result = reconcile::bulk_delete(&state, &body.ids, body.delete_files).await?;
    tracing::info!(
        requested_by = %auth.user_id,
        deleted = result.succeeded,
        failed = result.failed,
        delete_files = body.delete_files,
        "Bulk orphan delete finished"
    );
    Ok(Json(result))
}

// =============================================================================
// User-scoped
// =============================================================================

/// Orphan the caller may act on; anything else reads as not found.
async fn visible_orphan(state: &AppState, user_id: Uuid, orphan_id: Uuid) -> ApiResult<OrphanFileRow> {
    state
        .metadata
        .get_orphan(orphan_id)
        .await?
        .filter(|orphan| orphan_visible_to(orphan, user_id))
        .ok_or_else(|| ApiError::hidden("orphan"))
}

/// GET /web/orphans
pub async fn list_my_orphans(
    State(state): State<AppState>,
    Query(query): Query<OrphanListQuery>,
    req: Request,
) -> ApiResult<Json<OrphanListResponse>> {
    let auth = require_auth(&req)?.clone();
    let filter = OrphanFilter {
        status: query.status()?,
        unassigned_only: false,
        visible_to: Some(auth.user_id),
    };
    Ok(Json(list_with_filter(&state, filter, query.page()).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebClaimRequest {
    pub device_id: Option<Uuid>,
}

/// POST /web/orphans/{id}/claim - Claim a visible orphan for the caller.
pub async fn claim_my_orphan(
    State(state): State<AppState>,
    Path(orphan_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ClaimOutcome>> {
    let auth = require_auth(&req)?.clone();
    let orphan_id = parse_id(&orphan_id, "orphan")?;
    let body: WebClaimRequest = read_optional_json(req).await?;

    let orphan = visible_orphan(&state, auth.user_id, orphan_id).await?;
    let target = ClaimTarget {
        user_id: Some(auth.user_id),
        device_id: body.device_id,
    };
    Ok(Json(
        reconcile::claim_loaded_orphan(&state, orphan, target, auth.user_id).await?,
    ))
}

/// POST /web/orphans/{id}/ignore
pub async fn ignore_my_orphan(
    State(state): State<AppState>,
    Path(orphan_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ResolutionResponse>> {
    let auth = require_auth(&req)?.clone();
    let orphan_id = parse_id(&orphan_id, "orphan")?;
    let body: NotesRequest = read_optional_json(req).await?;

    visible_orphan(&state, auth.user_id, orphan_id).await?;
    let updated =
        reconcile::ignore_orphan(&state, orphan_id, auth.user_id, body.notes.as_deref()).await?;
    Ok(Json(ResolutionResponse {
        id: orphan_id,
        updated,
    }))
}
