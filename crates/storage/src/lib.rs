//! Blob storage for PhotoSync.
//!
//! This crate provides:
//! - The [`BlobStore`] abstraction with a local filesystem backend
//! - The [`MetadataCodec`] that keeps an ownership record next to each file
//! - The [`Thumbnailer`] producing JPEG previews

pub mod backends;
pub mod codec;
pub mod error;
pub mod thumbnail;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use codec::{MetadataCodec, SidecarCodec};
pub use error::{StorageError, StorageResult};
pub use thumbnail::{ImageThumbnailer, ThumbnailSet, Thumbnailer};
pub use traits::{BlobStore, ByteStream, ListingOptions, ListingPage, ObjectMeta, PageStream};

use photosync_core::config::StorageConfig;
use std::sync::Arc;

/// Create a blob store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    if config.path.as_os_str().is_empty() {
        return Err(StorageError::Config("storage.path cannot be empty".to_string()));
    }
    let backend = FilesystemBackend::new(&config.path).await?;
    Ok(Arc::new(backend))
}
