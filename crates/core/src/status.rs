//! Lifecycle states for reconciliation registries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a file discovered on disk without a catalog record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrphanStatus {
    /// Awaiting operator action.
    Pending,
    /// Excluded from pending queues, retained for audit.
    Ignored,
    /// Turned into a photo.
    Claimed,
}

impl OrphanStatus {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "ignored" => Ok(Self::Ignored),
            "claimed" => Ok(Self::Claimed),
            _ => Err(crate::Error::InvalidStatus(format!("unknown orphan status: {s}"))),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ignored => "ignored",
            Self::Claimed => "claimed",
        }
    }
}

impl fmt::Display for OrphanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a catalog/file disagreement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictStatus {
    #[serde(rename = "pending")]
    Pending,
    /// The file was rewritten to match the database.
    #[serde(rename = "resolvedDB")]
    ResolvedDb,
    /// The database was rewritten to match the file.
    #[serde(rename = "resolvedFile")]
    ResolvedFile,
    #[serde(rename = "ignored")]
    Ignored,
}

impl ConflictStatus {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolvedDB" => Ok(Self::ResolvedDb),
            "resolvedFile" => Ok(Self::ResolvedFile),
            "ignored" => Ok(Self::Ignored),
            _ => Err(crate::Error::InvalidStatus(format!(
                "unknown conflict status: {s}"
            ))),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ResolvedDb => "resolvedDB",
            Self::ResolvedFile => "resolvedFile",
            Self::Ignored => "ignored",
        }
    }

    /// All statuses, in display order.
    pub fn all() -> [Self; 4] {
        [
            Self::Pending,
            Self::ResolvedDb,
            Self::ResolvedFile,
            Self::Ignored,
        ]
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which ownership field disagrees.
///
/// Variants are declared in precedence order, so `Ord` ranks the dominant
/// mismatch lowest: a photo identity mismatch outranks a user mismatch,
/// which outranks a device mismatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictType {
    PhotoIdMismatch,
    UserIdMismatch,
    DeviceIdMismatch,
}

impl ConflictType {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "photoIdMismatch" => Ok(Self::PhotoIdMismatch),
            "userIdMismatch" => Ok(Self::UserIdMismatch),
            "deviceIdMismatch" => Ok(Self::DeviceIdMismatch),
            _ => Err(crate::Error::InvalidStatus(format!("unknown conflict type: {s}"))),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhotoIdMismatch => "photoIdMismatch",
            Self::UserIdMismatch => "userIdMismatch",
            Self::DeviceIdMismatch => "deviceIdMismatch",
        }
    }

    /// All conflict types, in precedence order.
    pub fn all() -> [Self; 3] {
        [
            Self::PhotoIdMismatch,
            Self::UserIdMismatch,
            Self::DeviceIdMismatch,
        ]
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
