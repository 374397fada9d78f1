//! HTTP server for PhotoSync.
//!
//! This crate provides:
//! - Upload ingest with content-hash deduplication
//! - The reconciliation scanner and its orphan/conflict resolution operations
//! - The cursor-paginated multi-device sync feed
//! - Authentication, metrics and the `photosyncd` binary

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod reconcile;
pub mod routes;
pub mod scanner;
pub mod state;
pub mod sync;
pub mod thumbnails;

pub use auth::{AuthenticatedUser, TraceId};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
