//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

/// API error response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Set for `duplicate_photo` errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_photo_id: Option<Uuid>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("duplicate photo: content {content_hash} already stored as {existing_photo_id}")]
    DuplicatePhoto {
        content_hash: String,
        existing_photo_id: Uuid,
    },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] photosync_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] photosync_metadata::MetadataError),

    #[error("core error: {0}")]
    Core(#[from] photosync_core::Error),
}

impl ApiError {
    /// Generic not-found used when a row belongs to someone else.
    pub fn hidden(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::DuplicatePhoto { .. } => "duplicate_photo",
            Self::Internal(_) => "internal_error",
            Self::Storage(e) => match e {
                photosync_storage::StorageError::NotFound(_) => "not_found",
                _ => "storage_error",
            },
            Self::Metadata(e) => match e {
                photosync_metadata::MetadataError::NotFound(_) => "not_found",
                photosync_metadata::MetadataError::AlreadyExists(_)
                | photosync_metadata::MetadataError::Constraint(_) => "conflict",
                _ => "metadata_error",
            },
            Self::Core(_) => "invalid_argument",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::DuplicatePhoto { .. } => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                photosync_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                photosync_storage::StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                photosync_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                photosync_metadata::MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                photosync_metadata::MetadataError::Constraint(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let existing_photo_id = match &self {
            Self::DuplicatePhoto {
                existing_photo_id, ..
            } => Some(*existing_photo_id),
            _ => None,
        };
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            existing_photo_id,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
