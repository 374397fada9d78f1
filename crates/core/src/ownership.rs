//! Ownership record stored alongside each photo file.

use crate::status::ConflictType;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Ownership and provenance fields embedded with a stored file.
///
/// Every field is optional: legacy and foreign files may carry only some of
/// them, or none at all.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub uploaded_at: Option<OffsetDateTime>,
}

/// The catalog side of an ownership comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CatalogOwnership {
    pub photo_id: Uuid,
    pub owner_user_id: Option<Uuid>,
    pub origin_device_id: Option<Uuid>,
}

impl EmbeddedMetadata {
    /// True when the record declares nothing.
    pub fn is_empty(&self) -> bool {
        self.photo_id.is_none()
            && self.user_id.is_none()
            && self.device_id.is_none()
            && self.content_hash.is_none()
            && self.uploaded_at.is_none()
    }

    /// Fields that disagree with the catalog, in precedence order.
    ///
    /// Only fields the file actually declares are compared; an absent field
    /// never counts as a mismatch.
    pub fn mismatches(&self, catalog: &CatalogOwnership) -> Vec<ConflictType> {
        let mut found = Vec::new();
        if let Some(photo_id) = self.photo_id
            && photo_id != catalog.photo_id
        {
            found.push(ConflictType::PhotoIdMismatch);
        }
        if let Some(user_id) = self.user_id
            && Some(user_id) != catalog.owner_user_id
        {
            found.push(ConflictType::UserIdMismatch);
        }
        if let Some(device_id) = self.device_id
            && Some(device_id) != catalog.origin_device_id
        {
            found.push(ConflictType::DeviceIdMismatch);
        }
        found
    }

    /// The dominant mismatch, if any.
    pub fn classify(&self, catalog: &CatalogOwnership) -> Option<ConflictType> {
        self.mismatches(catalog).into_iter().min()
    }

    /// Record describing a catalog photo, used when the database is authoritative.
    pub fn from_catalog(
        catalog: &CatalogOwnership,
        content_hash: &str,
        uploaded_at: OffsetDateTime,
    ) -> Self {
        Self {
            photo_id: Some(catalog.photo_id),
            user_id: catalog.owner_user_id,
            device_id: catalog.origin_device_id,
            content_hash: Some(content_hash.to_string()),
            uploaded_at: Some(uploaded_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> CatalogOwnership {
        CatalogOwnership {
            photo_id: Uuid::new_v4(),
            owner_user_id: Some(Uuid::new_v4()),
            origin_device_id: Some(Uuid::new_v4()),
        }
    }

    #[test]
    fn empty_record_never_mismatches() {
        let record = EmbeddedMetadata::default();
        assert!(record.is_empty());
        assert_eq!(record.classify(&catalog()), None);
    }

    #[test]
    fn matching_record_is_ok() {
        let c = catalog();
        let record = EmbeddedMetadata::from_catalog(&c, "ab", time::OffsetDateTime::UNIX_EPOCH);
        assert_eq!(record.classify(&c), None);
    }

    #[test]
    fn photo_id_mismatch_dominates_user_mismatch() {
        let c = catalog();
        let record = EmbeddedMetadata {
            photo_id: Some(Uuid::new_v4()),
            user_id: Some(Uuid::new_v4()),
            device_id: c.origin_device_id,
            ..Default::default()
        };
        assert_eq!(
            record.mismatches(&c),
            vec![ConflictType::PhotoIdMismatch, ConflictType::UserIdMismatch]
        );
        assert_eq!(record.classify(&c), Some(ConflictType::PhotoIdMismatch));
    }

    #[test]
    fn user_mismatch_dominates_device_mismatch() {
        let c = catalog();
        let record = EmbeddedMetadata {
            user_id: Some(Uuid::new_v4()),
            device_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        assert_eq!(record.classify(&c), Some(ConflictType::UserIdMismatch));
    }

    #[test]
    fn declared_device_against_legacy_photo_mismatches() {
        let mut c = catalog();
        c.origin_device_id = None;
        let record = EmbeddedMetadata {
            device_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        assert_eq!(record.classify(&c), Some(ConflictType::DeviceIdMismatch));
    }

    #[test]
    fn sidecar_json_uses_camel_case() {
        let record = EmbeddedMetadata {
            photo_id: Some(Uuid::nil()),
            content_hash: Some("ab".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("photoId").is_some());
        assert!(json.get("contentHash").is_some());
        assert!(json.get("userId").is_none());

        let parsed: EmbeddedMetadata = serde_json::from_str("{}").unwrap();
        assert!(parsed.is_empty());
    }
}
