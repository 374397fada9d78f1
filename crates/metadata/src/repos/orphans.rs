//! Orphan file registry.

use crate::error::MetadataResult;
use crate::models::{OrphanFileRow, PhotoRow};
use async_trait::async_trait;
use photosync_core::OrphanStatus;
use time::OffsetDateTime;
use uuid::Uuid;

/// Listing filter for orphan rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrphanFilter {
    pub status: Option<OrphanStatus>,
    /// Only rows with no pre-assigned user.
    pub unassigned_only: bool,
    /// Only rows a user may see: assigned to them, or unassigned and
    /// embedding their user id.
    pub visible_to: Option<Uuid>,
}

/// Pre-claim user/device staging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrphanAssignment {
    pub user_id: Option<Uuid>,
    pub device_id: Option<Uuid>,
}

/// Repository for files found on disk without a catalog record.
#[async_trait]
pub trait OrphanRepo: Send + Sync {
    /// Insert or refresh the row for `orphan.file_path` in one statement.
    ///
    /// Returns the stored row and whether it was newly inserted. Rows that
    /// are no longer pending keep their fields; only `last_seen_at` moves.
    async fn upsert_orphan(&self, orphan: &OrphanFileRow) -> MetadataResult<(OrphanFileRow, bool)>;

    async fn get_orphan(&self, id: Uuid) -> MetadataResult<Option<OrphanFileRow>>;

    async fn get_orphan_by_path(&self, file_path: &str) -> MetadataResult<Option<OrphanFileRow>>;

    /// Rows matching a filter, newest discovery first.
    async fn list_orphans(
        &self,
        filter: OrphanFilter,
        skip: u32,
        take: u32,
    ) -> MetadataResult<Vec<OrphanFileRow>>;

    async fn count_orphans(&self, filter: OrphanFilter) -> MetadataResult<i64>;

    /// Set the assignment of a pending row whose current assignment is
    /// `expected`. Returns false when the row moved on in the meantime.
    async fn assign_orphan(
        &self,
        id: Uuid,
        expected: OrphanAssignment,
        assignment: OrphanAssignment,
        changed_by: Option<Uuid>,
        changed_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Move a row from `from` to `to`. Returns false if it was not in `from`.
    async fn transition_orphan(
        &self,
        id: Uuid,
        from: OrphanStatus,
        to: OrphanStatus,
        changed_by: Option<Uuid>,
        changed_at: OffsetDateTime,
        notes: Option<&str>,
    ) -> MetadataResult<bool>;

    /// Atomically mark a pending row claimed and insert the photo built from it.
    ///
    /// Returns false without inserting when the row is no longer pending.
    /// A content hash collision surfaces as `AlreadyExists` and rolls back.
    async fn claim_orphan(
        &self,
        id: Uuid,
        photo: &PhotoRow,
        claimed_by: Option<Uuid>,
        claimed_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Remove a row, returning it.
    async fn delete_orphan(&self, id: Uuid) -> MetadataResult<Option<OrphanFileRow>>;
}
