//! Application state shared across handlers.

use crate::error::{ApiError, ApiResult};
use crate::scanner::SweepReport;
use photosync_core::config::AppConfig;
use photosync_metadata::MetadataStore;
use photosync_storage::{BlobStore, ImageThumbnailer, MetadataCodec, SidecarCodec, Thumbnailer};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

struct RunningSweep {
    started_at: OffsetDateTime,
    cancel: CancellationToken,
}

#[derive(Default)]
struct ScannerState {
    running: Option<RunningSweep>,
    last_report: Option<SweepReport>,
}

/// Single-flight control for reconciliation sweeps.
///
/// The only way to mark a sweep as running is [`ScannerControl::try_start`],
/// which hands out a [`SweepGuard`]; dropping the guard marks the scanner
/// idle again, even if the sweep task panicked.
#[derive(Default)]
pub struct ScannerControl {
    state: Mutex<ScannerState>,
}

/// Snapshot returned by the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerStatus {
    pub running: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    pub stop_requested: bool,
    pub last_report: Option<SweepReport>,
}

impl ScannerControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScannerState> {
        // A poisoned lock only means a holder panicked; the state is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark a sweep as running, or fail with `Conflict` if one already is.
    pub fn try_start(self: &Arc<Self>) -> ApiResult<SweepGuard> {
        let mut state = self.lock();
        if let Some(running) = &state.running {
            return Err(ApiError::Conflict(format!(
                "a sweep is already running (started {})",
                running.started_at
            )));
        }
        let started_at = OffsetDateTime::now_utc();
        let cancel = CancellationToken::new();
        state.running = Some(RunningSweep {
            started_at,
            cancel: cancel.clone(),
        });
        crate::metrics::SWEEP_RUNNING.set(1);
        Ok(SweepGuard {
            control: Arc::clone(self),
            cancel,
            started_at,
            report: None,
        })
    }

    /// Ask the running sweep to stop. Returns false when nothing is running.
    pub fn request_stop(&self) -> bool {
        let state = self.lock();
        match &state.running {
            Some(running) => {
                running.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().running.is_some()
    }

    pub fn status(&self) -> ScannerStatus {
        let state = self.lock();
        ScannerStatus {
            running: state.running.is_some(),
            started_at: state.running.as_ref().map(|r| r.started_at),
            stop_requested: state
                .running
                .as_ref()
                .is_some_and(|r| r.cancel.is_cancelled()),
            last_report: state.last_report.clone(),
        }
    }

    fn release(&self, report: Option<SweepReport>) {
        let mut state = self.lock();
        state.running = None;
        if report.is_some() {
            state.last_report = report;
        }
        crate::metrics::SWEEP_RUNNING.set(0);
    }
}

/// Proof that the caller owns the running sweep.
pub struct SweepGuard {
    control: Arc<ScannerControl>,
    cancel: CancellationToken,
    started_at: OffsetDateTime,
    report: Option<SweepReport>,
}

impl SweepGuard {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    /// Record the final report and release the scanner.
    pub fn finish(mut self, report: SweepReport) {
        self.report = Some(report);
    }
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        if self.report.is_none() {
            tracing::warn!(started_at = %self.started_at, "Sweep ended without a report");
        }
        self.control.release(self.report.take());
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Blob store holding photo files, sidecars and thumbnails.
    pub storage: Arc<dyn BlobStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Ownership record codec.
    pub codec: Arc<dyn MetadataCodec>,
    /// Thumbnail service.
    pub thumbnailer: Arc<dyn Thumbnailer>,
    /// Sweep single-flight control.
    pub scanner: Arc<ScannerControl>,
}

impl AppState {
    /// Create the application state with the default collaborators.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        if let Err(error) = config.validate() {
            panic!("Invalid configuration: {}", error);
        }

        let codec: Arc<dyn MetadataCodec> = Arc::new(SidecarCodec::new(storage.clone()));
        let thumbnailer: Arc<dyn Thumbnailer> = Arc::new(ImageThumbnailer::new(
            storage.clone(),
            config.thumbnails.clone(),
        ));

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            codec,
            thumbnailer,
            scanner: Arc::new(ScannerControl::new()),
        }
    }
}
