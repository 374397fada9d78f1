//! Core domain types and shared logic for PhotoSync.
//!
//! This crate defines the data model used across all other crates:
//! - Content hashes used as the deduplication key
//! - The ownership record embedded alongside stored files
//! - Closed status enums for orphans and conflicts
//! - Storage layout rules (device folders, sidecars, thumbnails)
//! - Sync cursors
//! - Configuration

pub mod config;
pub mod cursor;
pub mod error;
pub mod hash;
pub mod layout;
pub mod ownership;
pub mod status;

pub use cursor::SyncCursor;
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use layout::ThumbnailSize;
pub use ownership::EmbeddedMetadata;
pub use status::{ConflictStatus, ConflictType, OrphanStatus};

use time::{Duration, OffsetDateTime, UtcOffset};

/// Largest batch accepted by a hash existence check.
pub const MAX_HASH_BATCH: usize = 1000;

/// Normalize a timestamp for storage in the catalog: UTC, whole seconds.
///
/// Catalog timestamps take part in the `(uploaded_at, id)` sync ordering, so
/// every stored value must share one encoding.
pub fn catalog_timestamp(ts: OffsetDateTime) -> OffsetDateTime {
    let utc = ts.to_offset(UtcOffset::UTC);
    utc - Duration::nanoseconds(i64::from(utc.nanosecond()))
}

/// Smallest catalog timestamp at or after `ts`.
///
/// Lower bounds compared with `>=` use this, so a sub-second bound never
/// admits rows stored in the second before it.
pub fn catalog_timestamp_ceil(ts: OffsetDateTime) -> OffsetDateTime {
    let floor = catalog_timestamp(ts);
    if ts.nanosecond() == 0 {
        floor
    } else {
        floor + Duration::seconds(1)
    }
}

/// Current time normalized with [`catalog_timestamp`].
pub fn catalog_now() -> OffsetDateTime {
    catalog_timestamp(OffsetDateTime::now_utc())
}
