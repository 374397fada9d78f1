//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetadataError {
    /// True for SQLite UNIQUE constraint failures, optionally limited to one table.
    ///
    /// SQLite reports these as "UNIQUE constraint failed: photos.content_hash"
    /// or with the index name, so both forms are matched.
    pub fn is_unique_violation(&self, table: Option<&str>) -> bool {
        match self {
            MetadataError::Database(sqlx::Error::Database(db_err)) => {
                let msg = db_err.message();
                msg.contains("UNIQUE constraint") && table.is_none_or(|t| msg.contains(t))
            }
            MetadataError::AlreadyExists(_) => true,
            _ => false,
        }
    }
}

impl From<photosync_core::Error> for MetadataError {
    fn from(e: photosync_core::Error) -> Self {
        MetadataError::Internal(e.to_string())
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
