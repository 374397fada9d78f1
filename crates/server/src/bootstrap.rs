//! Admin account and token initialization.

use anyhow::{Result, bail};
use photosync_core::config::AdminConfig;
use photosync_metadata::MetadataStore;
use photosync_metadata::models::{TokenRow, UserRow};
use time::OffsetDateTime;
use uuid::Uuid;

/// Ensure the configured admin user and token exist, rotating the previous
/// token if needed.
///
/// If the token hash changes between restarts, the previous admin token is
/// revoked and a new one is created with the new hash.
pub async fn ensure_admin(metadata: &dyn MetadataStore, config: &AdminConfig) -> Result<Uuid> {
    // auth::hash_token produces lowercase hex
    let hash = config
        .token_hash
        .strip_prefix("sha256:")
        .unwrap_or(&config.token_hash)
        .to_lowercase();
    let hash = hash.as_str();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid admin token_hash: expected 64 hex chars");
    }

    let now = OffsetDateTime::now_utc();
    let admin = match metadata.get_user_by_username(&config.username).await? {
        Some(user) => {
            if !user.is_admin {
                bail!(
                    "configured admin username '{}' belongs to a non-admin user",
                    config.username
                );
            }
            user
        }
        None => {
            let user = UserRow {
                user_id: Uuid::new_v4(),
                username: config.username.clone(),
                is_admin: true,
                created_at: now,
            };
            metadata.create_user(&user).await?;
            tracing::info!(user_id = %user.user_id, username = %user.username, "Admin user created");
            user
        }
    };

    if let Some(existing) = metadata.get_token_by_hash(hash).await? {
        if existing.revoked_at.is_some() {
            bail!(
                "admin token hash matches a revoked token (id={}); use a new token hash",
                existing.token_id
            );
        }
        if existing.user_id != admin.user_id {
            bail!(
                "admin token hash is already issued to another user (token id={})",
                existing.token_id
            );
        }
        metadata.set_bootstrap_token_id(existing.token_id).await?;
        tracing::debug!("Admin token already exists");
        return Ok(admin.user_id);
    }

    if let Some(prev_id) = metadata.get_bootstrap_token_id().await? {
        metadata.revoke_token(prev_id, now).await?;
        tracing::info!(token_id = %prev_id, "Previous admin token revoked");
    }

    let token = TokenRow {
        token_id: Uuid::new_v4(),
        user_id: admin.user_id,
        token_hash: hash.to_string(),
        created_at: now,
        last_used_at: None,
        revoked_at: None,
        description: config.token_description.clone(),
    };

    metadata.create_token(&token).await?;
    metadata.set_bootstrap_token_id(token.token_id).await?;
    tracing::info!(token_id = %token.token_id, "Admin token created");

    Ok(admin.user_id)
}
