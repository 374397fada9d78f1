//! Device registry.

use crate::error::MetadataResult;
use crate::models::DeviceRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

#[async_trait]
pub trait DeviceRepo: Send + Sync {
    async fn create_device(&self, device: &DeviceRow) -> MetadataResult<()>;

    async fn get_device(&self, device_id: Uuid) -> MetadataResult<Option<DeviceRow>>;

    /// Devices owned by a user, oldest first.
    async fn list_devices_for_user(&self, user_id: Uuid) -> MetadataResult<Vec<DeviceRow>>;

    async fn touch_device(&self, device_id: Uuid, seen_at: OffsetDateTime) -> MetadataResult<()>;
}
