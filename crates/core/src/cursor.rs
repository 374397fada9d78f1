//! Opaque sync cursors.

use std::fmt;
use uuid::Uuid;

/// Position in the sync feed: everything up to and including the referenced
/// photo has been delivered.
///
/// Clients must treat the string form as opaque.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SyncCursor(Uuid);

impl SyncCursor {
    /// Cursor pointing at a delivered photo.
    pub fn after(photo_id: Uuid) -> Self {
        Self(photo_id)
    }

    /// Decode a client supplied cursor. Empty input means "first page".
    pub fn decode(s: &str) -> crate::Result<Option<Self>> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(None);
        }
        Uuid::parse_str(s)
            .map(|id| Some(Self(id)))
            .map_err(|e| crate::Error::InvalidCursor(e.to_string()))
    }

    /// The photo this cursor points at.
    pub fn photo_id(&self) -> Uuid {
        self.0
    }

    pub fn encode(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
