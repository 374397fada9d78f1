//! Catalog persistence for PhotoSync.
//!
//! This crate owns the database side of the system:
//! - The photo catalog and its content-hash dedup key
//! - Orphan and conflict registries filled by the reconciliation scanner
//! - Per-device sync state and the `(uploaded_at, id)` sync feed
//! - Users, devices and API tokens

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};

use photosync_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    let store = SqliteStore::new(&config.path, config.query_timeout_secs).await?;
    Ok(Arc::new(store) as Arc<dyn MetadataStore>)
}
