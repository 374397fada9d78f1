//! Storage key layout.
//!
//! Keys are `/`-separated paths relative to the storage root:
//! - `devices/{device}/{yyyy}/{mm}/{file}` for photos from a known device
//! - `users/{user}/{yyyy}/{mm}/{file}` otherwise
//! - `{key}.psmeta.json` sidecars holding the ownership record
//! - `.thumbnails/{photo}/{size}.jpg` generated thumbnails

use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Suffix appended to a photo key to form its sidecar key.
pub const SIDECAR_SUFFIX: &str = ".psmeta.json";

/// Prefix under which thumbnails are stored.
pub const THUMBNAIL_PREFIX: &str = ".thumbnails/";

/// Marker in the names of in-flight atomic writes.
pub const TEMP_MARKER: &str = ".tmp.";

/// Longest sanitized device folder name.
pub const MAX_DEVICE_NAME_LEN: usize = 50;

const UNSAFE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', ' '];

/// Sanitize a device display name for use as a folder name.
pub fn sanitize_device_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) { '_' } else { c })
        .collect();
    // Leading dots would turn `.` or `..` into a relative path component.
    let capped: String = replaced
        .trim()
        .trim_start_matches('.')
        .chars()
        .take(MAX_DEVICE_NAME_LEN)
        .collect();
    let lowered = capped.to_lowercase();
    if lowered.is_empty() {
        "unknown".to_string()
    } else {
        lowered
    }
}

/// Reduce a client supplied filename to a safe final path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| {
            if UNSAFE_CHARS.contains(&c) && c != ' ' {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');
    if cleaned.is_empty() {
        "photo".to_string()
    } else {
        defuse_reserved(cleaned)
    }
}

/// Rewrite name forms the store reserves for sidecars and staged writes.
fn defuse_reserved(name: &str) -> String {
    let mut name = name.to_string();
    while name.contains(TEMP_MARKER) {
        name = name.replace(TEMP_MARKER, "_tmp.");
    }
    if let Some(stem) = name.strip_suffix(SIDECAR_SUFFIX) {
        name = format!("{stem}_psmeta.json");
    }
    name
}

/// Final path component of a storage key.
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Key for a photo from a known device.
pub fn device_photo_key(device_name: &str, taken: OffsetDateTime, filename: &str) -> String {
    format!(
        "devices/{}/{:04}/{:02}/{}",
        sanitize_device_name(device_name),
        taken.year(),
        u8::from(taken.month()),
        sanitize_filename(filename)
    )
}

/// Key for a photo without device attribution.
pub fn user_photo_key(user_id: Uuid, taken: OffsetDateTime, filename: &str) -> String {
    format!(
        "users/{}/{:04}/{:02}/{}",
        user_id,
        taken.year(),
        u8::from(taken.month()),
        sanitize_filename(filename)
    )
}

/// Disambiguate a key that already exists by tagging it with the photo id.
///
/// `devices/a/2024/01/img.jpg` becomes `devices/a/2024/01/img_1a2b3c4d.jpg`.
pub fn with_collision_suffix(key: &str, photo_id: Uuid) -> String {
    let tag: String = photo_id.simple().to_string().chars().take(8).collect();
    let (dir, name) = match key.rfind('/') {
        Some(idx) => (&key[..=idx], &key[idx + 1..]),
        None => ("", key),
    };
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{dir}{}_{tag}{}", &name[..dot], &name[dot..]),
        _ => format!("{dir}{name}_{tag}"),
    }
}

/// Sidecar key for a photo key.
pub fn sidecar_key(key: &str) -> String {
    format!("{key}{SIDECAR_SUFFIX}")
}

/// Whether a key belongs to PhotoSync bookkeeping rather than a photo.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(THUMBNAIL_PREFIX)
        || key.ends_with(SIDECAR_SUFFIX)
        || file_name(key).contains(TEMP_MARKER)
}

/// Thumbnail variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThumbnailSize {
    Small,
    Medium,
    Large,
}

impl ThumbnailSize {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            _ => Err(crate::Error::InvalidThumbnailSize(s.to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::Small, Self::Medium, Self::Large]
    }
}

impl fmt::Display for ThumbnailSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of one thumbnail variant.
pub fn thumbnail_key(photo_id: Uuid, size: ThumbnailSize) -> String {
    format!("{THUMBNAIL_PREFIX}{photo_id}/{}.jpg", size.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_sanitize_device_name_replaces_unsafe_chars() {
        assert_eq!(sanitize_device_name("Bob's iPhone 15"), "bob's_iphone_15");
        assert_eq!(sanitize_device_name("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_sanitize_device_name_caps_length() {
        let long = "X".repeat(80);
        let sanitized = sanitize_device_name(&long);
        assert_eq!(sanitized.chars().count(), MAX_DEVICE_NAME_LEN);
        assert_eq!(sanitized, "x".repeat(MAX_DEVICE_NAME_LEN));
    }

    #[test]
    fn test_sanitize_device_name_defaults_to_unknown() {
        assert_eq!(sanitize_device_name(""), "unknown");
        assert_eq!(sanitize_device_name("\t\n"), "unknown");
    }

    #[test]
    fn test_sanitize_filename_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\photos\\IMG_1.JPG"), "IMG_1.JPG");
        assert_eq!(sanitize_filename(".."), "photo");
        assert_eq!(sanitize_filename("my photo.jpg"), "my photo.jpg");
    }

    #[test]
    fn test_sanitize_device_name_rejects_dot_components() {
        assert_eq!(sanitize_device_name(".."), "unknown");
        assert_eq!(sanitize_device_name("."), "unknown");
        assert_eq!(sanitize_device_name("..hidden"), "hidden");

        let key = device_photo_key("..", datetime!(2024-01-01 00:00 UTC), "x.jpg");
        assert_eq!(key, "devices/unknown/2024/01/x.jpg");
    }

    #[test]
    fn test_sanitize_filename_never_yields_reserved_names() {
        assert_eq!(sanitize_filename("a.jpg.psmeta.json"), "a.jpg_psmeta.json");
        assert_eq!(sanitize_filename("a.tmp.jpg"), "a_tmp.jpg");
        assert_eq!(sanitize_filename("a.tmp.tmp.jpg"), "a_tmp_tmp.jpg");

        for name in ["a.jpg.psmeta.json", "b.tmp.1234", "c.tmp.tmp.psmeta.json"] {
            let key = device_photo_key("cam", datetime!(2024-01-01 00:00 UTC), name);
            assert!(!is_reserved_key(&key), "{key} is reserved");
        }
    }

    #[test]
    fn test_device_photo_key() {
        let key = device_photo_key("Pixel 8", datetime!(2023-07-04 12:00 UTC), "IMG_1.jpg");
        assert_eq!(key, "devices/pixel_8/2023/07/IMG_1.jpg");
    }

    #[test]
    fn test_user_photo_key() {
        let user = Uuid::nil();
        let key = user_photo_key(user, datetime!(2021-12-31 23:59 UTC), "a.png");
        assert_eq!(key, format!("users/{user}/2021/12/a.png"));
    }

    #[test]
    fn test_collision_suffix() {
        let id = Uuid::parse_str("1a2b3c4d-0000-4000-8000-000000000000").unwrap();
        assert_eq!(
            with_collision_suffix("devices/a/2024/01/img.jpg", id),
            "devices/a/2024/01/img_1a2b3c4d.jpg"
        );
        assert_eq!(with_collision_suffix("noext", id), "noext_1a2b3c4d");
        assert_eq!(with_collision_suffix("dir/.hidden", id), "dir/.hidden_1a2b3c4d");
    }

    #[test]
    fn test_reserved_keys() {
        assert!(is_reserved_key(".thumbnails/abc/small.jpg"));
        assert!(is_reserved_key("devices/a/2024/01/img.jpg.psmeta.json"));
        assert!(is_reserved_key("devices/a/2024/01/img.jpg.tmp.1234"));
        assert!(!is_reserved_key("devices/a/2024/01/img.jpg"));
    }
}
