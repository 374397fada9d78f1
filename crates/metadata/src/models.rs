//! Database models mapping to the catalog schema.

use photosync_core::ownership::CatalogOwnership;
use photosync_core::{ConflictStatus, ConflictType, OrphanStatus};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::MetadataResult;

// =============================================================================
// Identity
// =============================================================================

/// User account.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub created_at: OffsetDateTime,
}

/// API token record. Only the SHA-256 hex of the token is stored.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub description: Option<String>,
}

/// Registered device.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceRow {
    pub device_id: Uuid,
    pub user_id: Uuid,
    pub device_name: String,
    pub platform: Option<String>,
    pub created_at: OffsetDateTime,
    pub last_seen_at: Option<OffsetDateTime>,
}

// =============================================================================
// Catalog
// =============================================================================

/// Authoritative photo record.
#[derive(Debug, Clone, FromRow)]
pub struct PhotoRow {
    pub id: Uuid,
    pub owner_user_id: Option<Uuid>,
    pub origin_device_id: Option<Uuid>,
    pub original_filename: String,
    pub stored_path: String,
    pub content_hash: String,
    pub file_size: i64,
    pub date_taken: OffsetDateTime,
    pub uploaded_at: OffsetDateTime,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub thumbnail_small: Option<String>,
    pub thumbnail_medium: Option<String>,
    pub thumbnail_large: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub updated_at: OffsetDateTime,
}

impl PhotoRow {
    /// Ownership fields compared against embedded metadata.
    pub fn ownership(&self) -> CatalogOwnership {
        CatalogOwnership {
            photo_id: self.id,
            owner_user_id: self.owner_user_id,
            origin_device_id: self.origin_device_id,
        }
    }

    pub fn has_all_thumbnails(&self) -> bool {
        self.thumbnail_small.is_some()
            && self.thumbnail_medium.is_some()
            && self.thumbnail_large.is_some()
    }
}

/// Photo joined with its origin device, as served by the sync feed.
#[derive(Debug, Clone, FromRow)]
pub struct SyncPhotoRow {
    #[sqlx(flatten)]
    pub photo: PhotoRow,
    pub origin_device_name: Option<String>,
    pub origin_platform: Option<String>,
}

/// Thumbnail keys and source dimensions written after generation.
#[derive(Debug, Clone, Default)]
pub struct ThumbnailUpdate {
    pub small: Option<String>,
    pub medium: Option<String>,
    pub large: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

// =============================================================================
// Reconciliation registries
// =============================================================================

/// File found on disk with no catalog record.
#[derive(Debug, Clone, FromRow)]
pub struct OrphanFileRow {
    pub id: Uuid,
    pub file_path: String,
    pub file_size: i64,
    pub file_hash: Option<String>,
    pub discovered_at: OffsetDateTime,
    pub last_seen_at: OffsetDateTime,
    pub embedded_photo_id: Option<Uuid>,
    pub embedded_user_id: Option<Uuid>,
    pub embedded_device_id: Option<Uuid>,
    pub embedded_file_hash: Option<String>,
    pub embedded_uploaded_at: Option<OffsetDateTime>,
    pub status: String,
    pub status_changed_at: Option<OffsetDateTime>,
    pub status_changed_by: Option<Uuid>,
    pub assigned_to_user: Option<Uuid>,
    pub assigned_to_device: Option<Uuid>,
    pub claimed_photo_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl OrphanFileRow {
    pub fn status(&self) -> MetadataResult<OrphanStatus> {
        Ok(OrphanStatus::parse(&self.status)?)
    }
}

/// Catalog record whose embedded metadata disagrees with the database.
#[derive(Debug, Clone, FromRow)]
pub struct FileConflictRow {
    pub id: Uuid,
    pub photo_id: Uuid,
    pub file_path: String,
    pub discovered_at: OffsetDateTime,
    pub last_seen_at: OffsetDateTime,
    pub conflict_type: String,
    pub db_photo_id: Option<Uuid>,
    pub db_user_id: Option<Uuid>,
    pub db_device_id: Option<Uuid>,
    pub file_photo_id: Option<Uuid>,
    pub file_user_id: Option<Uuid>,
    pub file_device_id: Option<Uuid>,
    pub status: String,
    pub resolved_at: Option<OffsetDateTime>,
    pub resolved_by: Option<Uuid>,
    pub resolution_notes: Option<String>,
}

impl FileConflictRow {
    pub fn status(&self) -> MetadataResult<ConflictStatus> {
        Ok(ConflictStatus::parse(&self.status)?)
    }

    pub fn conflict_type(&self) -> MetadataResult<ConflictType> {
        Ok(ConflictType::parse(&self.conflict_type)?)
    }
}

/// Per-status and per-type conflict counts.
#[derive(Debug, Clone, Default)]
pub struct ConflictStats {
    pub by_status: Vec<(String, i64)>,
    pub by_type: Vec<(String, i64)>,
}

// =============================================================================
// Sync
// =============================================================================

/// Sync bookkeeping for one device.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceSyncStateRow {
    pub device_id: Uuid,
    pub user_id: Uuid,
    pub last_sync_at: Option<OffsetDateTime>,
    pub last_sync_photo_id: Option<Uuid>,
    /// Upload time of `last_sync_photo_id`, kept so the position survives
    /// deletion of that photo.
    pub last_sync_uploaded_at: Option<OffsetDateTime>,
    pub sync_version: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Photo counts reported by the sync status call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub total: i64,
    pub this_device: i64,
    pub other_devices: i64,
    pub legacy: i64,
}
