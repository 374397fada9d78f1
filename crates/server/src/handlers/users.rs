//! Users, API keys and devices.

use crate::auth::{hash_token, require_admin, require_auth};
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::read_json;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use photosync_core::catalog_now;
use photosync_metadata::models::{DeviceRow, TokenRow, UserRow};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

const MAX_USERNAME_LEN: usize = 64;
const MAX_DEVICE_NAME_LEN: usize = 100;

/// Generate a random API key using a cryptographically secure RNG.
fn generate_api_key() -> String {
    use base64::Engine;
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Who the caller is.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoamiResponse {
    pub user_id: Uuid,
    pub username: String,
    pub is_admin: bool,
}

/// GET /auth/whoami
pub async fn whoami(req: Request) -> ApiResult<Json<WhoamiResponse>> {
    let auth = require_auth(&req)?;
    Ok(Json(WhoamiResponse {
        user_id: auth.user_id,
        username: auth.username.clone(),
        is_admin: auth.is_admin,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
    pub description: Option<String>,
}

/// The API key is only ever returned here.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserResponse {
    pub user_id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub token_id: Uuid,
    pub api_key: String,
}

/// POST /admin/users - Create a user with a fresh API key.
pub async fn create_user(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreateUserResponse>)> {
    let auth = require_admin(&req)?.clone();
    let body: CreateUserRequest = read_json(req).await?;

    let username = body.username.trim();
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(ApiError::InvalidArgument(format!(
            "username must be between 1 and {MAX_USERNAME_LEN} characters"
        )));
    }

    let now = catalog_now();
    let user = UserRow {
        user_id: Uuid::new_v4(),
        username: username.to_string(),
        is_admin: body.is_admin,
        created_at: now,
    };
    state.metadata.create_user(&user).await?;

    let api_key = generate_api_key();
    let token = TokenRow {
        token_id: Uuid::new_v4(),
        user_id: user.user_id,
        token_hash: hash_token(&api_key),
        created_at: now,
        last_used_at: None,
        revoked_at: None,
        description: body.description,
    };
    state.metadata.create_token(&token).await?;

    tracing::info!(
        user_id = %user.user_id,
        username = %user.username,
        is_admin = user.is_admin,
        created_by = %auth.user_id,
        "User created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            user_id: user.user_id,
            username: user.username,
            is_admin: user.is_admin,
            token_id: token.token_id,
            api_key,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    pub device_name: String,
    pub platform: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub device_id: Uuid,
    pub device_name: String,
    pub platform: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen_at: Option<OffsetDateTime>,
}

impl From<DeviceRow> for DeviceResponse {
    fn from(row: DeviceRow) -> Self {
        Self {
            device_id: row.device_id,
            device_name: row.device_name,
            platform: row.platform,
            created_at: row.created_at,
            last_seen_at: row.last_seen_at,
        }
    }
}

/// POST /devices - Register a device for the caller.
pub async fn register_device(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<DeviceResponse>)> {
    let auth = require_auth(&req)?.clone();
    let body: RegisterDeviceRequest = read_json(req).await?;

    let device_name = body.device_name.trim();
    if device_name.is_empty() || device_name.len() > MAX_DEVICE_NAME_LEN {
        return Err(ApiError::InvalidArgument(format!(
            "deviceName must be between 1 and {MAX_DEVICE_NAME_LEN} characters"
        )));
    }

    let now = catalog_now();
    let device = DeviceRow {
        device_id: Uuid::new_v4(),
        user_id: auth.user_id,
        device_name: device_name.to_string(),
        platform: body.platform.filter(|p| !p.trim().is_empty()),
        created_at: now,
        last_seen_at: Some(now),
    };
    state.metadata.create_device(&device).await?;

    tracing::info!(
        device_id = %device.device_id,
        user_id = %auth.user_id,
        device_name = %device.device_name,
        "Device registered"
    );

    Ok((StatusCode::CREATED, Json(device.into())))
}

/// GET /devices - The caller's devices.
pub async fn list_devices(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<Vec<DeviceResponse>>> {
    let auth = require_auth(&req)?.clone();
    let devices = state.metadata.list_devices_for_user(auth.user_id).await?;
    Ok(Json(devices.into_iter().map(DeviceResponse::from).collect()))
}
