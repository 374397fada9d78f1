//! Shared handler helpers.

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::Request;
use photosync_metadata::models::{DeviceRow, PhotoRow};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Maximum request body size for JSON endpoints (1 MiB).
pub const MAX_JSON_BODY_SIZE: usize = 1024 * 1024;

/// Default and maximum page size for registry and photo listings.
pub const DEFAULT_TAKE: u32 = 50;
pub const MAX_TAKE: u32 = 100;

/// Read and parse a JSON request body.
pub async fn read_json<T: DeserializeOwned>(req: Request) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY_SIZE)
        .await
        .map_err(|e| ApiError::InvalidArgument(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::InvalidArgument(format!("invalid JSON: {e}")))
}

/// Like [`read_json`], but an empty body yields `T::default()`.
pub async fn read_optional_json<T: DeserializeOwned + Default>(req: Request) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY_SIZE)
        .await
        .map_err(|e| ApiError::InvalidArgument(format!("failed to read body: {e}")))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::InvalidArgument(format!("invalid JSON: {e}")))
}

/// `skip`/`take` pagination parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub skip: Option<u32>,
    pub take: Option<u32>,
}

impl PageQuery {
    /// Validated `(skip, take)`.
    pub fn resolve(&self) -> ApiResult<(u32, u32)> {
        let take = self.take.unwrap_or(DEFAULT_TAKE);
        if take == 0 || take > MAX_TAKE {
            return Err(ApiError::InvalidArgument(format!(
                "take must be between 1 and {MAX_TAKE}"
            )));
        }
        Ok((self.skip.unwrap_or(0), take))
    }
}

/// Look up a device only if it belongs to `user_id`.
pub async fn find_owned_device(
    state: &AppState,
    user_id: Uuid,
    device_id: Uuid,
) -> ApiResult<Option<DeviceRow>> {
    Ok(state
        .metadata
        .get_device(device_id)
        .await?
        .filter(|device| device.user_id == user_id))
}

/// Device the caller names as its own, or `InvalidArgument`.
pub async fn require_owned_device(
    state: &AppState,
    user_id: Uuid,
    device_id: Uuid,
) -> ApiResult<DeviceRow> {
    find_owned_device(state, user_id, device_id)
        .await?
        .ok_or_else(|| {
            ApiError::InvalidArgument(format!("device {device_id} does not belong to the user"))
        })
}

/// Photo visible to the caller: owned by them, or any photo for admins.
///
/// Other users' photos read as not found.
pub async fn visible_photo(
    state: &AppState,
    auth: &AuthenticatedUser,
    photo_id: Uuid,
) -> ApiResult<PhotoRow> {
    state
        .metadata
        .get_photo(photo_id)
        .await?
        .filter(|photo| auth.is_admin || photo.owner_user_id == Some(auth.user_id))
        .ok_or_else(|| ApiError::hidden("photo"))
}

/// Parse a path segment as a UUID.
pub fn parse_id(raw: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::InvalidArgument(format!("invalid {what} id")))
}
