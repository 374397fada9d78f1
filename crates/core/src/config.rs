//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Largest accepted upload body in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// The endpoint is unauthenticated; restrict it at the network level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_upload_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Admin account configuration.
///
/// The admin token is required for server operation. If the token hash
/// changes between restarts, the previous admin token is revoked and a new
/// one is created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Pre-computed hash of the admin token (SHA256 hex, 64 characters).
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    pub token_hash: String,
    /// Username of the bootstrap admin account.
    #[serde(default = "default_admin_username")]
    pub username: String,
    /// Description for the admin token.
    pub token_description: Option<String>,
}

fn default_admin_username() -> String {
    "admin".to_string()
}

impl AdminConfig {
    /// Test configuration.
    ///
    /// **For testing only.** Matches the raw token `test-admin-token`.
    pub fn for_testing() -> Self {
        Self {
            // SHA256 of "test-admin-token"
            token_hash: "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
                .to_string(),
            username: default_admin_username(),
            token_description: Some("Test admin token".to_string()),
        }
    }
}

/// Blob store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding photos, sidecars and thumbnails.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/photos")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Catalog database configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// SQLite database file.
    #[serde(default = "default_metadata_path")]
    pub path: PathBuf,
    /// Query timeout in seconds (advisory only; SQLite cannot cancel queries).
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: Option<u64>,
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("./data/photosync.db")
}

fn default_query_timeout_secs() -> Option<u64> {
    Some(600)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

/// Reconciliation scanner configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Run full sweeps on a timer (disabled by default).
    #[serde(default)]
    pub auto_sweep_enabled: bool,
    /// Interval between automatic sweeps (default: 6 hours).
    #[serde(default = "default_auto_sweep_interval_secs")]
    pub auto_sweep_interval_secs: u64,
    /// Keys fetched per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Upper bound on files examined by one sweep.
    #[serde(default = "default_max_files_per_sweep")]
    pub max_files_per_sweep: u64,
    /// Fall back to a content hash lookup when no photo is stored at a path.
    /// Hashes every unknown file, so sweeps get slower.
    #[serde(default)]
    pub hash_fallback: bool,
    /// Log sweep progress every N files.
    #[serde(default = "default_progress_log_every")]
    pub progress_log_every: u64,
}

fn default_auto_sweep_interval_secs() -> u64 {
    6 * 3600
}

fn default_page_size() -> usize {
    500
}

fn default_max_files_per_sweep() -> u64 {
    1_000_000
}

fn default_progress_log_every() -> u64 {
    1000
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            auto_sweep_enabled: false,
            auto_sweep_interval_secs: default_auto_sweep_interval_secs(),
            page_size: default_page_size(),
            max_files_per_sweep: default_max_files_per_sweep(),
            hash_fallback: false,
            progress_log_every: default_progress_log_every(),
        }
    }
}

impl ScannerConfig {
    /// Get the auto sweep interval as a std::time::Duration.
    pub fn auto_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.auto_sweep_interval_secs)
    }

    /// Validate scanner configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.auto_sweep_enabled && self.auto_sweep_interval_secs == 0 {
            return Err("scanner.auto_sweep_interval_secs cannot be 0".to_string());
        }
        if self.page_size == 0 {
            return Err("scanner.page_size cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Sync feed limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_limit")]
    pub default_limit: u32,
    #[serde(default = "default_sync_max_limit")]
    pub max_limit: u32,
    /// Cap on the legacy photo listing.
    #[serde(default = "default_sync_max_limit")]
    pub legacy_max_limit: u32,
}

fn default_sync_limit() -> u32 {
    100
}

fn default_sync_max_limit() -> u32 {
    500
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_limit: default_sync_limit(),
            max_limit: default_sync_max_limit(),
            legacy_max_limit: default_sync_max_limit(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_limit == 0 || self.legacy_max_limit == 0 {
            return Err("sync limits must be at least 1".to_string());
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(format!(
                "sync.default_limit must be within 1..={}",
                self.max_limit
            ));
        }
        Ok(())
    }
}

/// Thumbnail generation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    #[serde(default = "default_thumbnails_enabled")]
    pub enabled: bool,
    /// Longest edge of the small variant.
    #[serde(default = "default_small_edge")]
    pub small: u32,
    #[serde(default = "default_medium_edge")]
    pub medium: u32,
    #[serde(default = "default_large_edge")]
    pub large: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Photos processed by one backfill job unless the caller asks for fewer.
    #[serde(default = "default_backfill_batch_size")]
    pub backfill_batch_size: u32,
}

fn default_thumbnails_enabled() -> bool {
    true
}

fn default_small_edge() -> u32 {
    256
}

fn default_medium_edge() -> u32 {
    1024
}

fn default_large_edge() -> u32 {
    2048
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_backfill_batch_size() -> u32 {
    50
}

/// Hard cap on a single backfill batch.
pub const MAX_BACKFILL_BATCH: u32 = 500;

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            enabled: default_thumbnails_enabled(),
            small: default_small_edge(),
            medium: default_medium_edge(),
            large: default_large_edge(),
            jpeg_quality: default_jpeg_quality(),
            backfill_batch_size: default_backfill_batch_size(),
        }
    }
}

impl ThumbnailConfig {
    /// Edge length for a variant.
    pub fn edge(&self, size: crate::ThumbnailSize) -> u32 {
        match size {
            crate::ThumbnailSize::Small => self.small,
            crate::ThumbnailSize::Medium => self.medium,
            crate::ThumbnailSize::Large => self.large,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.small == 0 || self.medium == 0 || self.large == 0 {
            return Err("thumbnail edge lengths must be positive".to_string());
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("thumbnails.jpeg_quality must be within 1..=100".to_string());
        }
        if self.backfill_batch_size == 0 || self.backfill_batch_size > MAX_BACKFILL_BATCH {
            return Err(format!(
                "thumbnails.backfill_batch_size must be within 1..={MAX_BACKFILL_BATCH}"
            ));
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Admin account configuration (required).
    pub admin: AdminConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses relative data paths and the `test-admin-token` admin key.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            admin: AdminConfig::for_testing(),
            scanner: ScannerConfig::default(),
            sync: SyncConfig::default(),
            thumbnails: ThumbnailConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.max_upload_bytes == 0 {
            return Err("server.max_upload_bytes cannot be 0".to_string());
        }
        self.scanner.validate()?;
        self.sync.validate()?;
        self.thumbnails.validate()?;
        Ok(())
    }
}
