//! Ownership metadata stored next to each photo file.
//!
//! The record lives in a JSON sidecar `{key}.psmeta.json`, so it follows the
//! file through moves performed by the server and survives the catalog being
//! rebuilt. Files copied in from elsewhere simply have no sidecar.

use crate::error::{StorageError, StorageResult};
use crate::traits::BlobStore;
use async_trait::async_trait;
use bytes::Bytes;
use photosync_core::EmbeddedMetadata;
use photosync_core::layout::sidecar_key;
use std::sync::Arc;

/// Reads and writes the ownership record embedded with a stored file.
#[async_trait]
pub trait MetadataCodec: Send + Sync {
    /// Read the record for a file. A missing or unreadable record is `None`.
    async fn read(&self, key: &str) -> StorageResult<Option<EmbeddedMetadata>>;

    /// Write (or replace) the record for a file.
    async fn write(&self, key: &str, metadata: &EmbeddedMetadata) -> StorageResult<()>;

    /// Follow a file that moved from `from` to `to`.
    async fn relocate(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Drop the record for a file. Missing records are not an error.
    async fn remove(&self, key: &str) -> StorageResult<()>;
}

/// JSON sidecar implementation of [`MetadataCodec`].
pub struct SidecarCodec {
    store: Arc<dyn BlobStore>,
}

impl SidecarCodec {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MetadataCodec for SidecarCodec {
    async fn read(&self, key: &str) -> StorageResult<Option<EmbeddedMetadata>> {
        let sidecar = sidecar_key(key);
        let data = match self.store.get(&sidecar).await {
            Ok(data) => data,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        match serde_json::from_slice::<EmbeddedMetadata>(&data) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                tracing::warn!(file_path = %key, error = %e, "ignoring unreadable metadata sidecar");
                Ok(None)
            }
        }
    }

    async fn write(&self, key: &str, metadata: &EmbeddedMetadata) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(metadata)
            .map_err(|e| StorageError::Codec(format!("failed to encode sidecar: {e}")))?;
        self.store.put(&sidecar_key(key), Bytes::from(json)).await
    }

    async fn relocate(&self, from: &str, to: &str) -> StorageResult<()> {
        let source = sidecar_key(from);
        if !self.store.exists(&source).await? {
            return Ok(());
        }
        let target = sidecar_key(to);
        // A stale sidecar at the target belongs to no file once this move lands.
        match self.store.delete(&target).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.store.rename(&source, &target).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        match self.store.delete(&sidecar_key(key)).await {
            Ok(()) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
