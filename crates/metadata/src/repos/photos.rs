//! Photo catalog repository.

use crate::error::MetadataResult;
use crate::models::{PhotoRow, ThumbnailUpdate};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for the authoritative photo catalog.
#[async_trait]
pub trait PhotoRepo: Send + Sync {
    /// Insert a photo.
    ///
    /// Returns `AlreadyExists` when the content hash is already owned or the
    /// stored path is taken.
    async fn insert_photo(&self, photo: &PhotoRow) -> MetadataResult<()>;

    async fn get_photo(&self, id: Uuid) -> MetadataResult<Option<PhotoRow>>;

    /// Find a photo by content hash, preferring owned rows.
    async fn get_photo_by_hash(&self, content_hash: &str) -> MetadataResult<Option<PhotoRow>>;

    /// Find the photo stored at a blob key.
    async fn get_photo_by_path(&self, stored_path: &str) -> MetadataResult<Option<PhotoRow>>;

    /// Subset of `hashes` present in the catalog.
    async fn existing_hashes(&self, hashes: &[String]) -> MetadataResult<Vec<String>>;

    /// Photos owned by a user, newest first.
    async fn list_photos_for_user(
        &self,
        user_id: Uuid,
        skip: u32,
        take: u32,
    ) -> MetadataResult<Vec<PhotoRow>>;

    async fn count_photos_for_user(&self, user_id: Uuid) -> MetadataResult<i64>;

    /// Point a photo at a new blob key.
    async fn update_photo_path(
        &self,
        id: Uuid,
        stored_path: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Record generated thumbnails.
    async fn set_thumbnails(
        &self,
        id: Uuid,
        thumbnails: &ThumbnailUpdate,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Photos lacking at least one thumbnail, oldest first.
    async fn list_photos_missing_thumbnails(&self, limit: u32) -> MetadataResult<Vec<PhotoRow>>;

    /// Delete a photo, returning the removed row.
    async fn delete_photo(&self, id: Uuid) -> MetadataResult<Option<PhotoRow>>;
}
