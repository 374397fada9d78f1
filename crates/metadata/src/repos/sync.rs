//! Sync feed and per-device sync bookkeeping.

use crate::error::MetadataResult;
use crate::models::{DeviceSyncStateRow, PhotoRow, SyncCounts, SyncPhotoRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Position in the `(uploaded_at, id)` feed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedPosition {
    pub uploaded_at: OffsetDateTime,
    pub id: Uuid,
}

#[async_trait]
pub trait SyncRepo: Send + Sync {
    /// Monotonic counter bumped by every catalog mutation.
    async fn catalog_version(&self) -> MetadataResult<i64>;

    /// Photo totals for a user, split by origin relative to `device_id`.
    async fn sync_counts(&self, user_id: Uuid, device_id: Uuid) -> MetadataResult<SyncCounts>;

    /// Up to `limit` of a user's photos strictly after `after`, in
    /// `(uploaded_at, id)` order, optionally restricted to
    /// `uploaded_at >= since`.
    async fn sync_page(
        &self,
        user_id: Uuid,
        after: Option<FeedPosition>,
        since: Option<OffsetDateTime>,
        limit: u32,
    ) -> MetadataResult<Vec<SyncPhotoRow>>;

    async fn get_sync_state(&self, device_id: Uuid) -> MetadataResult<Option<DeviceSyncStateRow>>;

    /// Get the state row for a device, creating it on first use.
    async fn ensure_sync_state(
        &self,
        device_id: Uuid,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> MetadataResult<DeviceSyncStateRow>;

    /// Record a served page and the feed position of its last row.
    async fn record_sync(
        &self,
        device_id: Uuid,
        synced_at: OffsetDateTime,
        last: FeedPosition,
        sync_version: i64,
    ) -> MetadataResult<()>;

    /// A user's photos with no origin device, oldest first.
    async fn legacy_photos(&self, user_id: Uuid, limit: u32) -> MetadataResult<Vec<PhotoRow>>;

    async fn count_legacy_photos(&self, user_id: Uuid) -> MetadataResult<i64>;

    /// Attribute legacy photos to a device in one statement.
    ///
    /// `photo_ids = None` targets every legacy photo of the user. Rows that
    /// already have an origin device are left untouched. Returns the ids
    /// that changed.
    async fn claim_legacy(
        &self,
        user_id: Uuid,
        device_id: Uuid,
        photo_ids: Option<&[Uuid]>,
        claimed_at: OffsetDateTime,
    ) -> MetadataResult<Vec<Uuid>>;
}
