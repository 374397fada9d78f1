//! Resolution operations for the orphan and conflict registries.
//!
//! Every mutation re-checks the row's status in the same statement that
//! changes it. A caller that loses a race gets a benign "not updated"
//! answer instead of an error.

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::require_owned_device;
use crate::ingest::{free_key, rename_into_place};
use crate::metrics::record_claim;
use crate::state::AppState;
use crate::thumbnails;
use photosync_core::layout::{device_photo_key, file_name};
use photosync_core::{
    ConflictStatus, ConflictType, ContentHash, EmbeddedMetadata, OrphanStatus, catalog_now,
    catalog_timestamp,
};
use photosync_metadata::models::{FileConflictRow, OrphanFileRow, PhotoRow};
use photosync_metadata::repos::OrphanAssignment;
use photosync_storage::StorageError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Largest id list accepted by the bulk endpoints.
pub const MAX_BULK_ITEMS: usize = 500;

// =============================================================================
// Orphans
// =============================================================================

/// Who a claimed orphan should belong to. Unset fields fall back to the
/// orphan's pre-assignment.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimTarget {
    pub user_id: Option<Uuid>,
    pub device_id: Option<Uuid>,
}

/// Result of a claim.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimOutcome {
    pub orphan_id: Uuid,
    pub photo_id: Option<Uuid>,
    pub stored_path: Option<String>,
    /// False when the orphan had already been claimed by someone else.
    pub claimed: bool,
    pub moved: bool,
    pub thumbnails_generated: bool,
}

impl ClaimOutcome {
    fn already_claimed(orphan: &OrphanFileRow) -> Self {
        Self {
            orphan_id: orphan.id,
            photo_id: orphan.claimed_photo_id,
            stored_path: None,
            claimed: false,
            moved: false,
            thumbnails_generated: false,
        }
    }
}

/// Whether a non-admin user may see and act on an orphan.
pub fn orphan_visible_to(orphan: &OrphanFileRow, user_id: Uuid) -> bool {
    match orphan.assigned_to_user {
        Some(assigned) => assigned == user_id,
        None => orphan.embedded_user_id == Some(user_id),
    }
}

async fn load_orphan(state: &AppState, id: Uuid) -> ApiResult<OrphanFileRow> {
    state
        .metadata
        .get_orphan(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("orphan {id} not found")))
}

/// Turn an orphan into a photo.
pub async fn claim_orphan(
    state: &AppState,
    orphan_id: Uuid,
    target: ClaimTarget,
    actor: Uuid,
) -> ApiResult<ClaimOutcome> {
    let orphan = load_orphan(state, orphan_id).await?;
    claim_loaded_orphan(state, orphan, target, actor).await
}

/// [`claim_orphan`] for a row the caller has already loaded.
pub async fn claim_loaded_orphan(
    state: &AppState,
    orphan: OrphanFileRow,
    target: ClaimTarget,
    actor: Uuid,
) -> ApiResult<ClaimOutcome> {
    match orphan.status()? {
        OrphanStatus::Pending => {}
        OrphanStatus::Claimed => return Ok(ClaimOutcome::already_claimed(&orphan)),
        OrphanStatus::Ignored => {
            return Err(ApiError::Conflict(format!(
                "orphan {} is ignored",
                orphan.id
            )));
        }
    }

    let owner_id = target.user_id.or(orphan.assigned_to_user).ok_or_else(|| {
        ApiError::InvalidArgument("userId is required for an unassigned orphan".to_string())
    })?;
    if state.metadata.get_user(owner_id).await?.is_none() {
        return Err(ApiError::InvalidArgument(format!(
            "user {owner_id} does not exist"
        )));
    }

    // The pre-assigned device only applies to the pre-assigned user.
    let device_id = target.device_id.or_else(|| {
        (orphan.assigned_to_user == Some(owner_id))
            .then_some(orphan.assigned_to_device)
            .flatten()
    });
    let device = match device_id {
        Some(device_id) => Some(require_owned_device(state, owner_id, device_id).await?),
        None => None,
    };

    let bytes = match state.storage.get(&orphan.file_path).await {
        Ok(bytes) => bytes,
        Err(StorageError::NotFound(_)) => {
            return Err(ApiError::NotFound(format!(
                "file {} no longer exists",
                orphan.file_path
            )));
        }
        Err(e) => return Err(e.into()),
    };
    let content_hash = ContentHash::compute(&bytes).to_hex();
    if let Some(existing) = state.metadata.get_photo_by_hash(&content_hash).await? {
        record_claim("duplicate");
        return Err(ApiError::DuplicatePhoto {
            content_hash,
            existing_photo_id: existing.id,
        });
    }

    // Keep the embedded identity when nothing else has taken it.
    let photo_id = match orphan.embedded_photo_id {
        Some(id) if state.metadata.get_photo(id).await?.is_none() => id,
        _ => Uuid::new_v4(),
    };
    let now = catalog_now();
    let date_taken = match state.storage.head(&orphan.file_path).await {
        Ok(meta) => meta.last_modified.map(catalog_timestamp).unwrap_or(now),
        Err(_) => now,
    };

    let mut photo = PhotoRow {
        id: photo_id,
        owner_user_id: Some(owner_id),
        origin_device_id: device.as_ref().map(|d| d.device_id),
        original_filename: file_name(&orphan.file_path).to_string(),
        stored_path: orphan.file_path.clone(),
        content_hash,
        file_size: bytes.len() as i64,
        date_taken,
        uploaded_at: now,
        width: None,
        height: None,
        thumbnail_small: None,
        thumbnail_medium: None,
        thumbnail_large: None,
        camera_make: None,
        camera_model: None,
        latitude: None,
        longitude: None,
        updated_at: now,
    };

    match state
        .metadata
        .claim_orphan(orphan.id, &photo, Some(actor), now)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            // Someone else changed the orphan between our read and the update.
            let current = load_orphan(state, orphan.id).await?;
            return match current.status()? {
                OrphanStatus::Claimed => Ok(ClaimOutcome::already_claimed(&current)),
                _ => Err(ApiError::Conflict(format!(
                    "orphan {} changed while it was being claimed",
                    orphan.id
                ))),
            };
        }
        Err(e) if e.is_unique_violation(None) => {
            record_claim("failed");
            if let Some(existing) = state.metadata.get_photo_by_hash(&photo.content_hash).await? {
                return Err(ApiError::DuplicatePhoto {
                    content_hash: photo.content_hash,
                    existing_photo_id: existing.id,
                });
            }
            return Err(ApiError::Conflict(format!(
                "claim collided with an existing photo: {e}"
            )));
        }
        Err(e) => {
            record_claim("failed");
            return Err(e.into());
        }
    }
    record_claim("claimed");

    let mut moved = false;
    if let Some(device) = &device {
        let target_key =
            device_photo_key(&device.device_name, photo.date_taken, &photo.original_filename);
        if target_key != photo.stored_path
            && let Some(new_key) = relocate_claimed(state, &photo, &target_key).await
        {
            photo.stored_path = new_key;
            moved = true;
        }
    }

    let mut thumbnails_generated = false;
    if state.config.thumbnails.enabled {
        match thumbnails::regenerate(state, &photo, Some(bytes)).await {
            Ok(_) => thumbnails_generated = true,
            Err(e) => {
                tracing::warn!(photo_id = %photo.id, error = %e, "Thumbnail generation after claim failed");
            }
        }
    }

    let record = EmbeddedMetadata::from_catalog(&photo.ownership(), &photo.content_hash, now);
    if let Err(e) = state.codec.write(&photo.stored_path, &record).await {
        tracing::warn!(photo_id = %photo.id, error = %e, "Failed to write sidecar after claim");
    }

    tracing::info!(
        orphan_id = %orphan.id,
        photo_id = %photo.id,
        user_id = %owner_id,
        stored_path = %photo.stored_path,
        moved,
        "Orphan claimed"
    );

    Ok(ClaimOutcome {
        orphan_id: orphan.id,
        photo_id: Some(photo.id),
        stored_path: Some(photo.stored_path),
        claimed: true,
        moved,
        thumbnails_generated,
    })
}

/// Move a freshly claimed file into its device folder.
///
/// The catalog row is repointed before the file moves, so a concurrent
/// sweep never finds the file at a path the catalog does not know.
/// Best-effort: returns the new key on success, `None` when the file stays
/// where it was.
async fn relocate_claimed(state: &AppState, photo: &PhotoRow, target_key: &str) -> Option<String> {
    let from = photo.stored_path.as_str();
    let target = match free_key(state, target_key, photo.id).await {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!(photo_id = %photo.id, to = %target_key, error = %e, "Failed to check claim destination, keeping original path");
            return None;
        }
    };

    if let Err(e) = state
        .metadata
        .update_photo_path(photo.id, &target, catalog_now())
        .await
    {
        tracing::warn!(photo_id = %photo.id, to = %target, error = %e, "Failed to record new path, keeping original path");
        return None;
    }

    let new_key = match rename_into_place(state, photo.id, from, &target).await {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!(
                photo_id = %photo.id,
                from = %from,
                to = %target,
                error = %e,
                "Failed to move claimed file, keeping original path"
            );
            if let Err(e) = state
                .metadata
                .update_photo_path(photo.id, from, catalog_now())
                .await
            {
                tracing::error!(
                    photo_id = %photo.id,
                    actual_path = %from,
                    error = %e,
                    "Claimed file is no longer at its catalog path"
                );
            }
            return None;
        }
    };

    if let Err(e) = state.codec.relocate(from, &new_key).await {
        tracing::warn!(photo_id = %photo.id, error = %e, "Failed to move sidecar with claimed file");
    }
    Some(new_key)
}

/// Stage an owner for a pending orphan without creating a photo.
///
/// Returns false when the orphan stopped being pending or its assignment
/// changed concurrently.
pub async fn assign_orphan(
    state: &AppState,
    orphan_id: Uuid,
    assignment: OrphanAssignment,
    actor: Uuid,
) -> ApiResult<bool> {
    let orphan = load_orphan(state, orphan_id).await?;
    if orphan.status()? != OrphanStatus::Pending {
        return Ok(false);
    }

    match (assignment.user_id, assignment.device_id) {
        (Some(user_id), device_id) => {
            if state.metadata.get_user(user_id).await?.is_none() {
                return Err(ApiError::InvalidArgument(format!(
                    "user {user_id} does not exist"
                )));
            }
            if let Some(device_id) = device_id {
                require_owned_device(state, user_id, device_id).await?;
            }
        }
        (None, Some(_)) => {
            return Err(ApiError::InvalidArgument(
                "deviceId requires userId".to_string(),
            ));
        }
        (None, None) => {}
    }

    let expected = OrphanAssignment {
        user_id: orphan.assigned_to_user,
        device_id: orphan.assigned_to_device,
    };
    let updated = state
        .metadata
        .assign_orphan(orphan_id, expected, assignment, Some(actor), catalog_now())
        .await?;
    if updated {
        tracing::info!(
            orphan_id = %orphan_id,
            user_id = ?assignment.user_id,
            device_id = ?assignment.device_id,
            "Orphan assigned"
        );
    }
    Ok(updated)
}

/// Move a pending orphan to `ignored`. False if it was no longer pending.
pub async fn ignore_orphan(
    state: &AppState,
    orphan_id: Uuid,
    actor: Uuid,
    notes: Option<&str>,
) -> ApiResult<bool> {
    load_orphan(state, orphan_id).await?;
    let updated = state
        .metadata
        .transition_orphan(
            orphan_id,
            OrphanStatus::Pending,
            OrphanStatus::Ignored,
            Some(actor),
            catalog_now(),
            notes,
        )
        .await?;
    if updated {
        tracing::info!(orphan_id = %orphan_id, "Orphan ignored");
    }
    Ok(updated)
}

/// Per-item bulk result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemResult {
    pub id: Uuid,
    pub success: bool,
    /// False when the row was left unchanged by a concurrent caller.
    pub updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkItemResult {
    fn ok(id: Uuid, updated: bool) -> Self {
        Self {
            id,
            success: true,
            updated,
            photo_id: None,
            code: None,
            error: None,
        }
    }

    fn failed(id: Uuid, error: &ApiError) -> Self {
        Self {
            id,
            success: false,
            updated: false,
            photo_id: None,
            code: Some(error.code()),
            error: Some(error.to_string()),
        }
    }
}

/// Bulk result summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResult {
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResult>,
}

impl From<Vec<BulkItemResult>> for BulkResult {
    fn from(results: Vec<BulkItemResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }
}

fn check_bulk_ids(ids: &[Uuid]) -> ApiResult<()> {
    if ids.is_empty() || ids.len() > MAX_BULK_ITEMS {
        return Err(ApiError::InvalidArgument(format!(
            "ids must contain between 1 and {MAX_BULK_ITEMS} entries"
        )));
    }
    Ok(())
}

/// Claim each orphan independently.
pub async fn bulk_claim(
    state: &AppState,
    ids: &[Uuid],
    target: ClaimTarget,
    actor: Uuid,
) -> ApiResult<BulkResult> {
    check_bulk_ids(ids)?;
    let mut results = Vec::with_capacity(ids.len());
    for &id in ids {
        let item = match claim_orphan(state, id, target, actor).await {
            Ok(outcome) => BulkItemResult {
                photo_id: outcome.photo_id,
                ..BulkItemResult::ok(id, outcome.claimed)
            },
            Err(e) => {
                tracing::warn!(orphan_id = %id, error = %e, "Bulk claim item failed");
                BulkItemResult::failed(id, &e)
            }
        };
        results.push(item);
    }
    Ok(results.into())
}

/// Assign each orphan independently.
pub async fn bulk_assign(
    state: &AppState,
    ids: &[Uuid],
    assignment: OrphanAssignment,
    actor: Uuid,
) -> ApiResult<BulkResult> {
    check_bulk_ids(ids)?;
    let mut results = Vec::with_capacity(ids.len());
    for &id in ids {
        let item = match assign_orphan(state, id, assignment, actor).await {
            Ok(updated) => BulkItemResult::ok(id, updated),
            Err(e) => BulkItemResult::failed(id, &e),
        };
        results.push(item);
    }
    Ok(results.into())
}

/// Remove registry rows and, optionally, the files they point at.
///
/// A file is never removed while a catalog photo is stored at its path.
pub async fn bulk_delete(state: &AppState, ids: &[Uuid], delete_files: bool) -> ApiResult<BulkResult> {
    check_bulk_ids(ids)?;
    let mut results = Vec::with_capacity(ids.len());
    for &id in ids {
        let item = match delete_orphan(state, id, delete_files).await {
            Ok(()) => BulkItemResult::ok(id, true),
            Err(e) => BulkItemResult::failed(id, &e),
        };
        results.push(item);
    }
    Ok(results.into())
}

async fn delete_orphan(state: &AppState, id: Uuid, delete_files: bool) -> ApiResult<()> {
    let orphan = state
        .metadata
        .delete_orphan(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("orphan {id} not found")))?;
    tracing::info!(orphan_id = %id, file_path = %orphan.file_path, "Orphan record deleted");

    if !delete_files {
        return Ok(());
    }
    if state
        .metadata
        .get_photo_by_path(&orphan.file_path)
        .await?
        .is_some()
    {
        tracing::info!(file_path = %orphan.file_path, "File now belongs to a photo, keeping it");
        return Ok(());
    }
    match state.storage.delete(&orphan.file_path).await {
        Ok(()) | Err(StorageError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }
    if let Err(e) = state.codec.remove(&orphan.file_path).await {
        tracing::warn!(file_path = %orphan.file_path, error = %e, "Failed to delete orphan sidecar");
    }
    Ok(())
}

// =============================================================================
// Conflicts
// =============================================================================

async fn load_pending_conflict(
    state: &AppState,
    id: Uuid,
) -> ApiResult<Option<(FileConflictRow, PhotoRow)>> {
    let conflict = state
        .metadata
        .get_conflict(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("conflict {id} not found")))?;
    if conflict.status()? != ConflictStatus::Pending {
        return Ok(None);
    }
    let photo = state
        .metadata
        .get_photo(conflict.photo_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "photo {} referenced by conflict {id} no longer exists",
                conflict.photo_id
            ))
        })?;
    Ok(Some((conflict, photo)))
}

/// Rewrite the file's ownership record from the catalog.
pub async fn resolve_with_db(
    state: &AppState,
    conflict_id: Uuid,
    actor: Uuid,
    notes: Option<&str>,
) -> ApiResult<bool> {
    let Some((conflict, photo)) = load_pending_conflict(state, conflict_id).await? else {
        return Ok(false);
    };

    let record =
        EmbeddedMetadata::from_catalog(&photo.ownership(), &photo.content_hash, photo.uploaded_at);
    state.codec.write(&conflict.file_path, &record).await?;

    let updated = state
        .metadata
        .close_conflict(
            conflict_id,
            ConflictStatus::ResolvedDb,
            Some(actor),
            catalog_now(),
            notes,
        )
        .await?;
    if updated {
        tracing::info!(conflict_id = %conflict_id, photo_id = %photo.id, "Conflict resolved from catalog");
    }
    Ok(updated)
}

/// Rewrite the catalog's ownership fields from the file.
///
/// A photo id mismatch only moves ownership; the note flags the row for a
/// human to decide whether the two identities are the same photo.
pub async fn resolve_with_file(
    state: &AppState,
    conflict_id: Uuid,
    actor: Uuid,
    notes: Option<&str>,
) -> ApiResult<bool> {
    let Some((conflict, photo)) = load_pending_conflict(state, conflict_id).await? else {
        return Ok(false);
    };

    let owner = conflict.file_user_id.or(photo.owner_user_id);
    let device = conflict.file_device_id.or(photo.origin_device_id);
    if let Some(user_id) = conflict.file_user_id
        && state.metadata.get_user(user_id).await?.is_none()
    {
        return Err(ApiError::InvalidArgument(format!(
            "file declares unknown user {user_id}"
        )));
    }
    if let Some(device_id) = conflict.file_device_id {
        let row = state.metadata.get_device(device_id).await?.ok_or_else(|| {
            ApiError::InvalidArgument(format!("file declares unknown device {device_id}"))
        })?;
        if Some(row.user_id) != owner {
            return Err(ApiError::InvalidArgument(format!(
                "device {device_id} does not belong to the resolved owner"
            )));
        }
    }

    let mut note = notes.map(str::to_string);
    if conflict.conflict_type()? == ConflictType::PhotoIdMismatch {
        let flag = format!(
            "photo id mismatch: file declares {}, catalog has {}; ownership updated, manual review required",
            conflict
                .file_photo_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "none".to_string()),
            photo.id
        );
        note = Some(match note {
            Some(existing) => format!("{existing}\n{flag}"),
            None => flag,
        });
    }

    let updated = state
        .metadata
        .resolve_conflict_with_file(
            conflict_id,
            photo.id,
            owner,
            device,
            Some(actor),
            catalog_now(),
            note.as_deref(),
        )
        .await?;
    if updated {
        tracing::info!(
            conflict_id = %conflict_id,
            photo_id = %photo.id,
            owner = ?owner,
            device = ?device,
            "Conflict resolved from file"
        );
    }
    Ok(updated)
}

/// Move a pending conflict to `ignored`. False if it was no longer pending.
pub async fn ignore_conflict(
    state: &AppState,
    conflict_id: Uuid,
    actor: Uuid,
    notes: Option<&str>,
) -> ApiResult<bool> {
    if state.metadata.get_conflict(conflict_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("conflict {conflict_id} not found")));
    }
    let updated = state
        .metadata
        .close_conflict(
            conflict_id,
            ConflictStatus::Ignored,
            Some(actor),
            catalog_now(),
            notes,
        )
        .await?;
    if updated {
        tracing::info!(conflict_id = %conflict_id, "Conflict ignored");
    }
    Ok(updated)
}
