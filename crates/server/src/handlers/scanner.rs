//! Reconciliation scanner control.

use crate::auth::require_admin;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::read_json;
use crate::scanner::{self, IntegrityReport, ScanMode, ScanOutcome, SweepReport};
use crate::state::{AppState, ScannerStatus};
use axum::Json;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// GET /admin/scanner/status
pub async fn scanner_status(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<ScannerStatus>> {
    require_admin(&req)?;
    Ok(Json(state.scanner.status()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSweepResponse {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
}

/// POST /admin/scanner/start - Start a background sweep.
pub async fn start_sweep(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<StartSweepResponse>)> {
    let auth = require_admin(&req)?;
    let started_at = scanner::spawn_sweep(&state)?;
    tracing::info!(requested_by = %auth.user_id, "Background sweep requested");
    Ok((StatusCode::ACCEPTED, Json(StartSweepResponse { started_at })))
}

#[derive(Debug, Serialize)]
pub struct StopSweepResponse {
    pub stopping: bool,
}

/// POST /admin/scanner/stop - Ask the running sweep to stop.
pub async fn stop_sweep(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<StopSweepResponse>)> {
    require_admin(&req)?;
    let stopping = state.scanner.request_stop();
    Ok((StatusCode::ACCEPTED, Json(StopSweepResponse { stopping })))
}

/// POST /admin/scanner/run - Sweep synchronously and return the report.
pub async fn run_sweep(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<SweepReport>> {
    require_admin(&req)?;
    let guard = state.scanner.try_start()?;
    Ok(Json(scanner::run_sweep(state.clone(), guard).await))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanFileRequest {
    pub file_path: String,
}

/// POST /admin/scanner/scan-file - Classify one stored file.
pub async fn scan_file(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<ScanOutcome>> {
    require_admin(&req)?;
    let body: ScanFileRequest = read_json(req).await?;
    let file_path = body.file_path.trim().trim_start_matches('/');
    if file_path.is_empty() {
        return Err(ApiError::InvalidArgument("filePath is required".to_string()));
    }
    if !state.storage.exists(file_path).await? {
        return Err(ApiError::NotFound(format!("file {file_path} not found")));
    }
    Ok(Json(
        scanner::classify_file(&state, file_path, ScanMode::Lookup).await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyQuery {
    pub photo_id: Uuid,
}

/// GET /admin/scanner/verify?photoId=..
pub async fn verify_photo(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
    req: Request,
) -> ApiResult<Json<IntegrityReport>> {
    require_admin(&req)?;
    Ok(Json(scanner::verify_photo(&state, query.photo_id).await?))
}
