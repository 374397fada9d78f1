//! File conflict registry.

use crate::error::MetadataResult;
use crate::models::{ConflictStats, FileConflictRow};
use async_trait::async_trait;
use photosync_core::{ConflictStatus, ConflictType};
use time::OffsetDateTime;
use uuid::Uuid;

/// Listing filter for conflict rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictFilter {
    pub status: Option<ConflictStatus>,
    pub conflict_type: Option<ConflictType>,
}

/// Repository for catalog records whose embedded metadata disagrees.
#[async_trait]
pub trait ConflictRepo: Send + Sync {
    /// Insert or refresh the row for `(photo_id, file_path)` in one statement.
    ///
    /// Pending rows take the new classification; resolved and ignored rows
    /// only record that they were seen again.
    async fn upsert_conflict(
        &self,
        conflict: &FileConflictRow,
    ) -> MetadataResult<(FileConflictRow, bool)>;

    async fn get_conflict(&self, id: Uuid) -> MetadataResult<Option<FileConflictRow>>;

    async fn get_conflict_for(
        &self,
        photo_id: Uuid,
        file_path: &str,
    ) -> MetadataResult<Option<FileConflictRow>>;

    async fn list_conflicts(
        &self,
        filter: ConflictFilter,
        skip: u32,
        take: u32,
    ) -> MetadataResult<Vec<FileConflictRow>>;

    async fn count_conflicts(&self, filter: ConflictFilter) -> MetadataResult<i64>;

    async fn conflict_stats(&self) -> MetadataResult<ConflictStats>;

    /// Move a pending row to `to`. Returns false if it was no longer pending.
    async fn close_conflict(
        &self,
        id: Uuid,
        to: ConflictStatus,
        resolved_by: Option<Uuid>,
        resolved_at: OffsetDateTime,
        notes: Option<&str>,
    ) -> MetadataResult<bool>;

    /// Atomically mark a pending row resolvedFile and rewrite the photo's
    /// ownership fields.
    ///
    /// Returns false without touching the photo when the row was no longer
    /// pending; returns `NotFound` (and rolls back) when the photo is gone.
    #[allow(clippy::too_many_arguments)]
    async fn resolve_conflict_with_file(
        &self,
        id: Uuid,
        photo_id: Uuid,
        owner_user_id: Option<Uuid>,
        origin_device_id: Option<Uuid>,
        resolved_by: Option<Uuid>,
        resolved_at: OffsetDateTime,
        notes: Option<&str>,
    ) -> MetadataResult<bool>;
}
