//! Test fixtures for generating test data.

use bytes::Bytes;
use photosync_core::{ContentHash, catalog_now};
use photosync_metadata::models::PhotoRow;
use std::io::Cursor;
use time::OffsetDateTime;
use uuid::Uuid;

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Lowercase hex content hash of data.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn content_hash(data: &[u8]) -> String {
    ContentHash::compute(data).to_hex()
}

/// A small valid JPEG whose pixels depend on `seed`.
#[allow(dead_code)]
pub fn jpeg_bytes(seed: u8) -> Bytes {
    let img = image::RgbImage::from_fn(64, 48, |x, y| {
        image::Rgb([seed, (x * 4) as u8, (y * 5) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Jpeg)
        .expect("Failed to encode JPEG");
    Bytes::from(out.into_inner())
}

/// Catalog row for direct inserts.
#[allow(dead_code)]
pub fn photo_row(
    owner: Uuid,
    device: Option<Uuid>,
    uploaded_at: OffsetDateTime,
    seed: u64,
) -> PhotoRow {
    let id = Uuid::new_v4();
    let data = seeded_bytes(seed, 32);
    PhotoRow {
        id,
        owner_user_id: Some(owner),
        origin_device_id: device,
        original_filename: format!("IMG_{seed:04}.jpg"),
        stored_path: format!("users/{owner}/imported/{id}.jpg"),
        content_hash: content_hash(&data),
        file_size: data.len() as i64,
        date_taken: uploaded_at,
        uploaded_at,
        width: None,
        height: None,
        thumbnail_small: None,
        thumbnail_medium: None,
        thumbnail_large: None,
        camera_make: None,
        camera_model: None,
        latitude: None,
        longitude: None,
        updated_at: catalog_now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let a = seeded_bytes(42, 100);
        let b = seeded_bytes(42, 100);
        assert_eq!(a, b);

        let c = seeded_bytes(43, 100);
        assert_ne!(a, c);
    }
}
