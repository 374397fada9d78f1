//! Thumbnail generation.

use crate::error::{StorageError, StorageResult};
use crate::traits::BlobStore;
use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use photosync_core::ThumbnailSize;
use photosync_core::config::ThumbnailConfig;
use photosync_core::layout::thumbnail_key;
use std::sync::Arc;
use uuid::Uuid;

/// Keys of the generated variants and the source dimensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThumbnailSet {
    pub small: String,
    pub medium: String,
    pub large: String,
    pub width: u32,
    pub height: u32,
}

/// Produces the small/medium/large previews of a photo.
#[async_trait]
pub trait Thumbnailer: Send + Sync {
    /// Decode `source` and store every variant for `photo_id`.
    async fn generate(&self, photo_id: Uuid, source: Bytes) -> StorageResult<ThumbnailSet>;

    /// Delete every stored variant for `photo_id`.
    async fn remove(&self, photo_id: Uuid) -> StorageResult<()>;
}

/// [`Thumbnailer`] backed by the `image` crate, writing JPEGs to a blob store.
pub struct ImageThumbnailer {
    store: Arc<dyn BlobStore>,
    config: ThumbnailConfig,
}

struct Rendered {
    variants: Vec<(ThumbnailSize, Vec<u8>)>,
    width: u32,
    height: u32,
}

impl ImageThumbnailer {
    pub fn new(store: Arc<dyn BlobStore>, config: ThumbnailConfig) -> Self {
        Self { store, config }
    }

    fn render(source: &[u8], config: &ThumbnailConfig) -> StorageResult<Rendered> {
        let img = image::load_from_memory(source)
            .map_err(|e| StorageError::Thumbnail(format!("failed to decode image: {e}")))?;
        let (width, height) = (img.width(), img.height());

        let mut variants = Vec::with_capacity(3);
        for size in ThumbnailSize::all() {
            let edge = config.edge(size);
            // Never upscale.
            let scaled = if width > edge || height > edge {
                img.resize(edge, edge, FilterType::Triangle)
            } else {
                img.clone()
            };
            let mut buf = Vec::new();
            scaled
                .to_rgb8()
                .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, config.jpeg_quality))
                .map_err(|e| StorageError::Thumbnail(format!("failed to encode {size}: {e}")))?;
            variants.push((size, buf));
        }

        Ok(Rendered {
            variants,
            width,
            height,
        })
    }
}

#[async_trait]
impl Thumbnailer for ImageThumbnailer {
    #[tracing::instrument(skip(self, source), fields(size = source.len()))]
    async fn generate(&self, photo_id: Uuid, source: Bytes) -> StorageResult<ThumbnailSet> {
        let config = self.config.clone();
        let rendered = tokio::task::spawn_blocking(move || Self::render(&source, &config))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })??;

        for (size, data) in rendered.variants {
            self.store
                .put(&thumbnail_key(photo_id, size), Bytes::from(data))
                .await?;
        }

        Ok(ThumbnailSet {
            small: thumbnail_key(photo_id, ThumbnailSize::Small),
            medium: thumbnail_key(photo_id, ThumbnailSize::Medium),
            large: thumbnail_key(photo_id, ThumbnailSize::Large),
            width: rendered.width,
            height: rendered.height,
        })
    }

    async fn remove(&self, photo_id: Uuid) -> StorageResult<()> {
        for size in ThumbnailSize::all() {
            match self.store.delete(&thumbnail_key(photo_id, size)).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FilesystemBackend;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Bytes {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        Bytes::from(out.into_inner())
    }

    fn small_config() -> ThumbnailConfig {
        ThumbnailConfig {
            small: 16,
            medium: 32,
            large: 64,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_generate_writes_every_variant() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn BlobStore> = Arc::new(FilesystemBackend::new(dir.path()).await.unwrap());
        let thumbnailer = ImageThumbnailer::new(store.clone(), small_config());
        let photo_id = Uuid::new_v4();

        let set = thumbnailer.generate(photo_id, png(100, 50)).await.unwrap();
        assert_eq!((set.width, set.height), (100, 50));

        let small = image::load_from_memory(&store.get(&set.small).await.unwrap()).unwrap();
        assert_eq!((small.width(), small.height()), (16, 8));

        let large = image::load_from_memory(&store.get(&set.large).await.unwrap()).unwrap();
        assert_eq!((large.width(), large.height()), (64, 32));

        // Sources smaller than the edge are not upscaled.
        let tiny = thumbnailer.generate(Uuid::new_v4(), png(10, 5)).await.unwrap();
        let large = image::load_from_memory(&store.get(&tiny.large).await.unwrap()).unwrap();
        assert_eq!((large.width(), large.height()), (10, 5));

        thumbnailer.remove(photo_id).await.unwrap();
        assert!(!store.exists(&set.medium).await.unwrap());
    }

    #[tokio::test]
    async fn test_generate_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn BlobStore> = Arc::new(FilesystemBackend::new(dir.path()).await.unwrap());
        let thumbnailer = ImageThumbnailer::new(store, small_config());

        let err = thumbnailer
            .generate(Uuid::new_v4(), Bytes::from_static(b"definitely not an image"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Thumbnail(_)));
    }
}
