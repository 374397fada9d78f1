//! Prometheus metrics for the PhotoSync server.
//!
//! Exposes counters for ingest, reconciliation sweeps, orphan claims and the
//! sync feed.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry aggregate counts only (no user ids, paths or hashes), but
//! the endpoint should still be network-restricted to the scraper.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{self, Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Ingest metrics
pub static PHOTOS_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "photosync_photos_uploaded_total",
        "Total number of photos stored through the upload path",
    )
    .expect("metric creation failed")
});

pub static DUPLICATE_UPLOADS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "photosync_duplicate_uploads_total",
        "Total number of uploads answered with an existing photo",
    )
    .expect("metric creation failed")
});

pub static BYTES_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "photosync_bytes_stored_total",
        "Total bytes written for new photos",
    )
    .expect("metric creation failed")
});

// Reconciliation metrics
pub static SWEEPS_RUN: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "photosync_sweeps_total",
            "Total reconciliation sweeps by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static SWEEP_RUNNING: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "photosync_sweep_running",
        "1 while a reconciliation sweep is in progress",
    )
    .expect("metric creation failed")
});

pub static FILES_SCANNED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "photosync_files_scanned_total",
        "Total files classified by the scanner",
    )
    .expect("metric creation failed")
});

pub static ORPHANS_DISCOVERED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "photosync_orphans_discovered_total",
        "Total new orphan files registered",
    )
    .expect("metric creation failed")
});

pub static CONFLICTS_DISCOVERED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "photosync_conflicts_discovered_total",
        "Total new file conflicts registered",
    )
    .expect("metric creation failed")
});

pub static CLAIMS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("photosync_orphan_claims_total", "Orphan claims by outcome"),
        &["outcome"],
    )
    .expect("metric creation failed")
});

// Sync metrics
pub static SYNC_PAGES_SERVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "photosync_sync_pages_served_total",
        "Total sync feed pages served",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build many routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(PHOTOS_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DUPLICATE_UPLOADS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_STORED.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(SWEEPS_RUN.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SWEEP_RUNNING.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FILES_SCANNED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ORPHANS_DISCOVERED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CONFLICTS_DISCOVERED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CLAIMS.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(SYNC_PAGES_SERVED.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record the outcome of one orphan claim.
pub fn record_claim(outcome: &str) {
    CLAIMS.with_label_values(&[outcome]).inc();
}

/// Record a finished sweep.
pub fn record_sweep(cancelled: bool) {
    let outcome = if cancelled { "cancelled" } else { "completed" };
    SWEEPS_RUN.with_label_values(&[outcome]).inc();
}
