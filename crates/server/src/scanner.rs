//! Reconciliation scanner.
//!
//! Walks the blob store and classifies every photo file against the catalog:
//! - no catalog record: the file is registered as an orphan
//! - embedded ownership disagrees with the catalog: a conflict is registered
//! - otherwise the file is OK and nothing is written
//!
//! Registry writes are upserts keyed by path (orphans) or by photo and path
//! (conflicts), so repeated sweeps never duplicate rows. A clean rescan never
//! clears an existing row; only the resolution operations do that.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{CONFLICTS_DISCOVERED, FILES_SCANNED, ORPHANS_DISCOVERED, record_sweep};
use crate::state::{AppState, SweepGuard};
use futures::StreamExt;
use photosync_core::hash::normalize_hex;
use photosync_core::layout::is_reserved_key;
use photosync_core::{
    ConflictStatus, ConflictType, ContentHash, EmbeddedMetadata, OrphanStatus, catalog_now,
    catalog_timestamp,
};
use photosync_metadata::models::{FileConflictRow, OrphanFileRow, PhotoRow};
use photosync_storage::{BlobStore, ListingOptions, StorageError};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Counters for one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub files_scanned: u64,
    pub ok: u64,
    /// Orphan rows created by this sweep.
    pub orphans_found: u64,
    /// Orphan rows that already existed and were observed again.
    pub orphans_seen: u64,
    pub conflicts_found: u64,
    pub conflicts_seen: u64,
    /// Reserved keys (sidecars, thumbnails, temp files).
    pub skipped: u64,
    pub errors: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    pub cancelled: bool,
    /// The sweep stopped at `scanner.max_files_per_sweep`.
    pub truncated: bool,
}

impl SweepReport {
    pub fn started(started_at: OffsetDateTime) -> Self {
        Self {
            files_scanned: 0,
            ok: 0,
            orphans_found: 0,
            orphans_seen: 0,
            conflicts_found: 0,
            conflicts_seen: 0,
            skipped: 0,
            errors: 0,
            started_at,
            finished_at: None,
            cancelled: false,
            truncated: false,
        }
    }

    fn record(&mut self, outcome: &ScanOutcome) {
        match (outcome.classification, outcome.created) {
            (Classification::Ok, _) => self.ok += 1,
            (Classification::Orphan, true) => self.orphans_found += 1,
            (Classification::Orphan, false) => self.orphans_seen += 1,
            (Classification::Conflict, true) => self.conflicts_found += 1,
            (Classification::Conflict, false) => self.conflicts_seen += 1,
        }
    }
}

/// How a stored file relates to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Classification {
    Ok,
    Orphan,
    Conflict,
}

/// Result of classifying one file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub file_path: String,
    pub classification: Classification,
    pub photo_id: Option<Uuid>,
    pub orphan_id: Option<Uuid>,
    pub conflict_id: Option<Uuid>,
    pub conflict_type: Option<ConflictType>,
    /// A registry row was created by this scan.
    pub created: bool,
}

impl ScanOutcome {
    fn ok(file_path: &str, photo_id: Uuid) -> Self {
        Self {
            file_path: file_path.to_string(),
            classification: Classification::Ok,
            photo_id: Some(photo_id),
            orphan_id: None,
            conflict_id: None,
            conflict_type: None,
            created: false,
        }
    }

    fn orphan(row: &OrphanFileRow, created: bool) -> Self {
        Self {
            file_path: row.file_path.clone(),
            classification: Classification::Orphan,
            photo_id: row.claimed_photo_id,
            orphan_id: Some(row.id),
            conflict_id: None,
            conflict_type: None,
            created,
        }
    }

    fn conflict(row: &FileConflictRow, created: bool) -> ApiResult<Self> {
        Ok(Self {
            file_path: row.file_path.clone(),
            classification: Classification::Conflict,
            photo_id: Some(row.photo_id),
            orphan_id: None,
            conflict_id: Some(row.id),
            conflict_type: Some(row.conflict_type()?),
            created,
        })
    }
}

/// Whether a scan records what it finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Upsert every orphan and conflict, refreshing `last_seen_at`.
    Sweep,
    /// Return an existing registry row untouched; write only new findings.
    Lookup,
}

/// Hash a stored object without loading it whole.
pub async fn hash_blob(storage: &dyn BlobStore, key: &str) -> ApiResult<String> {
    let mut stream = storage.get_stream(key).await?;
    let mut hasher = ContentHash::hasher();
    while let Some(chunk) = stream.next().await {
        hasher.update(&chunk?);
    }
    Ok(hasher.finalize().to_hex())
}

/// Classify one stored file and update the registries.
pub async fn classify_file(state: &AppState, key: &str, mode: ScanMode) -> ApiResult<ScanOutcome> {
    if is_reserved_key(key) {
        return Err(ApiError::InvalidArgument(format!(
            "{key} is a reserved key, not a photo file"
        )));
    }

    let mut computed_hash = None;
    let mut photo = state.metadata.get_photo_by_path(key).await?;
    if photo.is_none() && state.config.scanner.hash_fallback {
        let hash = hash_blob(state.storage.as_ref(), key).await?;
        photo = state.metadata.get_photo_by_hash(&hash).await?;
        computed_hash = Some(hash);
    }

    let embedded = state.codec.read(key).await?;
    match photo {
        None => register_orphan(state, key, embedded, computed_hash, mode).await,
        Some(photo) => compare_with_catalog(state, key, &photo, embedded, mode).await,
    }
}

async fn register_orphan(
    state: &AppState,
    key: &str,
    embedded: Option<EmbeddedMetadata>,
    file_hash: Option<String>,
    mode: ScanMode,
) -> ApiResult<ScanOutcome> {
    if mode == ScanMode::Lookup
        && let Some(existing) = state.metadata.get_orphan_by_path(key).await?
    {
        return Ok(ScanOutcome::orphan(&existing, false));
    }

    let meta = state.storage.head(key).await?;
    let embedded = embedded.unwrap_or_default();
    let now = catalog_now();
    let row = OrphanFileRow {
        id: Uuid::new_v4(),
        file_path: key.to_string(),
        file_size: i64::try_from(meta.size).unwrap_or(i64::MAX),
        file_hash,
        discovered_at: now,
        last_seen_at: now,
        embedded_photo_id: embedded.photo_id,
        embedded_user_id: embedded.user_id,
        embedded_device_id: embedded.device_id,
        embedded_file_hash: embedded.content_hash.as_deref().map(normalize_hex),
        embedded_uploaded_at: embedded.uploaded_at.map(catalog_timestamp),
        status: OrphanStatus::Pending.as_str().to_string(),
        status_changed_at: None,
        status_changed_by: None,
        assigned_to_user: None,
        assigned_to_device: None,
        claimed_photo_id: None,
        notes: None,
    };

    let (row, inserted) = state.metadata.upsert_orphan(&row).await?;
    if inserted {
        ORPHANS_DISCOVERED.inc();
        tracing::info!(orphan_id = %row.id, file_path = %key, "Orphan file registered");
    } else {
        tracing::trace!(orphan_id = %row.id, file_path = %key, "Orphan file seen again");
    }
    Ok(ScanOutcome::orphan(&row, inserted))
}

async fn compare_with_catalog(
    state: &AppState,
    key: &str,
    photo: &PhotoRow,
    embedded: Option<EmbeddedMetadata>,
    mode: ScanMode,
) -> ApiResult<ScanOutcome> {
    // Files without an ownership record carry nothing to disagree with.
    let Some(embedded) = embedded else {
        tracing::trace!(photo_id = %photo.id, file_path = %key, "No embedded metadata");
        return Ok(ScanOutcome::ok(key, photo.id));
    };
    let Some(conflict_type) = embedded.classify(&photo.ownership()) else {
        return Ok(ScanOutcome::ok(key, photo.id));
    };

    if mode == ScanMode::Lookup
        && let Some(existing) = state.metadata.get_conflict_for(photo.id, key).await?
    {
        return ScanOutcome::conflict(&existing, false);
    }

    let now = catalog_now();
    let row = FileConflictRow {
        id: Uuid::new_v4(),
        photo_id: photo.id,
        file_path: key.to_string(),
        discovered_at: now,
        last_seen_at: now,
        conflict_type: conflict_type.as_str().to_string(),
        db_photo_id: Some(photo.id),
        db_user_id: photo.owner_user_id,
        db_device_id: photo.origin_device_id,
        file_photo_id: embedded.photo_id,
        file_user_id: embedded.user_id,
        file_device_id: embedded.device_id,
        status: ConflictStatus::Pending.as_str().to_string(),
        resolved_at: None,
        resolved_by: None,
        resolution_notes: None,
    };

    let (row, inserted) = state.metadata.upsert_conflict(&row).await?;
    if inserted {
        CONFLICTS_DISCOVERED.inc();
        tracing::info!(
            conflict_id = %row.id,
            photo_id = %photo.id,
            file_path = %key,
            conflict_type = %conflict_type,
            "File conflict registered"
        );
    }
    ScanOutcome::conflict(&row, inserted)
}

/// Run a full sweep. The guard is released when the sweep ends.
pub async fn run_sweep(state: AppState, guard: SweepGuard) -> SweepReport {
    let config = &state.config.scanner;
    let cancel = guard.cancel_token().clone();
    let mut report = SweepReport::started(guard.started_at());
    tracing::info!(page_size = config.page_size, "Reconciliation sweep started");

    let mut pages = state
        .storage
        .list_pages("", ListingOptions::new(config.page_size));

    'pages: while let Some(page) = pages.next().await {
        let page = match page {
            Ok(page) => page,
            Err(e) => {
                report.errors += 1;
                tracing::warn!(error = %e, "Failed to list storage page");
                continue;
            }
        };

        for key in page.keys {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break 'pages;
            }
            if is_reserved_key(&key) {
                report.skipped += 1;
                continue;
            }
            if report.files_scanned >= config.max_files_per_sweep {
                report.truncated = true;
                tracing::warn!(
                    max_files = config.max_files_per_sweep,
                    "Sweep reached its file limit, stopping early"
                );
                break 'pages;
            }

            report.files_scanned += 1;
            FILES_SCANNED.inc();
            match classify_file(&state, &key, ScanMode::Sweep).await {
                Ok(outcome) => {
                    tracing::debug!(
                        file_path = %key,
                        classification = ?outcome.classification,
                        "File classified"
                    );
                    report.record(&outcome);
                }
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(file_path = %key, error = %e, "Failed to classify file");
                }
            }

            if config.progress_log_every > 0
                && report.files_scanned % config.progress_log_every == 0
            {
                tracing::info!(
                    files_scanned = report.files_scanned,
                    orphans_found = report.orphans_found,
                    conflicts_found = report.conflicts_found,
                    errors = report.errors,
                    "Sweep progress"
                );
            }
        }
    }
    drop(pages);

    report.finished_at = Some(OffsetDateTime::now_utc());
    record_sweep(report.cancelled);
    tracing::info!(
        files_scanned = report.files_scanned,
        ok = report.ok,
        orphans_found = report.orphans_found,
        orphans_seen = report.orphans_seen,
        conflicts_found = report.conflicts_found,
        skipped = report.skipped,
        errors = report.errors,
        cancelled = report.cancelled,
        "Reconciliation sweep finished"
    );

    guard.finish(report.clone());
    report
}

/// Start a sweep in the background. Fails with `Conflict` if one is running.
pub fn spawn_sweep(state: &AppState) -> ApiResult<OffsetDateTime> {
    let guard = state.scanner.try_start()?;
    let started_at = guard.started_at();
    let state = state.clone();
    tokio::spawn(async move {
        run_sweep(state, guard).await;
    });
    Ok(started_at)
}

/// Hash comparison for one catalog photo.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub photo_id: Uuid,
    pub stored_path: String,
    pub expected_hash: String,
    pub actual_hash: Option<String>,
    pub file_missing: bool,
    pub matches: bool,
}

/// Recompute a photo's content hash and compare it with the catalog.
pub async fn verify_photo(state: &AppState, photo_id: Uuid) -> ApiResult<IntegrityReport> {
    let photo = state
        .metadata
        .get_photo(photo_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("photo {photo_id} not found")))?;

    let actual_hash = match hash_blob(state.storage.as_ref(), &photo.stored_path).await {
        Ok(hash) => Some(hash),
        Err(ApiError::Storage(StorageError::NotFound(_))) => None,
        Err(e) => return Err(e),
    };

    let matches = actual_hash.as_deref() == Some(photo.content_hash.as_str());
    if !matches {
        tracing::warn!(
            photo_id = %photo.id,
            stored_path = %photo.stored_path,
            file_missing = actual_hash.is_none(),
            "Integrity check failed"
        );
    }

    Ok(IntegrityReport {
        photo_id: photo.id,
        file_missing: actual_hash.is_none(),
        stored_path: photo.stored_path,
        expected_hash: photo.content_hash,
        actual_hash,
        matches,
    })
}
