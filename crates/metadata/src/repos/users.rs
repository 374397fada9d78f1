//! User and API token repository.

use crate::error::MetadataResult;
use crate::models::{TokenRow, UserRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for users and their API tokens.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Create a user. Fails with `AlreadyExists` on a taken username.
    async fn create_user(&self, user: &UserRow) -> MetadataResult<()>;

    async fn get_user(&self, user_id: Uuid) -> MetadataResult<Option<UserRow>>;

    async fn get_user_by_username(&self, username: &str) -> MetadataResult<Option<UserRow>>;

    /// Create a token.
    async fn create_token(&self, token: &TokenRow) -> MetadataResult<()>;

    /// Get a token by hash.
    async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>>;

    /// Get a token by ID.
    async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>>;

    /// Update last used time.
    async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()>;

    /// Revoke a token.
    async fn revoke_token(&self, token_id: Uuid, revoked_at: OffsetDateTime) -> MetadataResult<()>;

    /// List tokens belonging to a user.
    async fn list_tokens_for_user(&self, user_id: Uuid) -> MetadataResult<Vec<TokenRow>>;
}
