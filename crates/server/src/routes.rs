//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (unauthenticated for load balancers)
        .route("/health", get(handlers::health_check))
        .route("/auth/whoami", get(handlers::whoami))
        // Identity
        .route("/admin/users", post(handlers::create_user))
        .route(
            "/devices",
            post(handlers::register_device).get(handlers::list_devices),
        )
        // Photo catalog
        .route(
            "/photos",
            post(handlers::upload_photo).get(handlers::list_photos),
        )
        .route("/photos/check", post(handlers::check_hashes))
        .route(
            "/photos/{photo_id}",
            get(handlers::get_photo).delete(handlers::delete_photo),
        )
        .route("/photos/{photo_id}/file", get(handlers::get_photo_file))
        .route(
            "/photos/{photo_id}/thumbnail/{size}",
            get(handlers::get_photo_thumbnail),
        )
        .route(
            "/admin/thumbnails/backfill",
            post(handlers::backfill_thumbnails),
        )
        // Reconciliation scanner
        .route("/admin/scanner/status", get(handlers::scanner_status))
        .route(
            "/admin/scanner/start",
            post(handlers::start_sweep).get(handlers::start_sweep),
        )
        .route(
            "/admin/scanner/stop",
            post(handlers::stop_sweep).get(handlers::stop_sweep),
        )
        .route(
            "/admin/scanner/run",
            post(handlers::run_sweep).get(handlers::run_sweep),
        )
        .route("/admin/scanner/scan-file", post(handlers::scan_file))
        .route("/admin/scanner/verify", get(handlers::verify_photo))
        // Orphan registry
        .route("/admin/orphans", get(handlers::list_orphans))
        .route(
            "/admin/orphans/unassigned",
            get(handlers::list_unassigned_orphans),
        )
        .route(
            "/admin/orphans/bulk-claim",
            post(handlers::bulk_claim_orphans),
        )
        .route(
            "/admin/orphans/bulk-assign",
            post(handlers::bulk_assign_orphans),
        )
        .route(
            "/admin/orphans/bulk-delete",
            post(handlers::bulk_delete_orphans),
        )
        .route("/admin/orphans/{orphan_id}", get(handlers::get_orphan))
        .route(
            "/admin/orphans/{orphan_id}/claim",
            post(handlers::admin_claim_orphan),
        )
        .route(
            "/admin/orphans/{orphan_id}/assign",
            post(handlers::assign_orphan),
        )
        .route(
            "/admin/orphans/{orphan_id}/ignore",
            post(handlers::admin_ignore_orphan),
        )
        .route("/web/orphans", get(handlers::list_my_orphans))
        .route(
            "/web/orphans/{orphan_id}/claim",
            post(handlers::claim_my_orphan),
        )
        .route(
            "/web/orphans/{orphan_id}/ignore",
            post(handlers::ignore_my_orphan),
        )
        // Conflict registry
        .route("/admin/conflicts", get(handlers::list_conflicts))
        .route(
            "/admin/conflicts/pending",
            get(handlers::list_pending_conflicts),
        )
        .route("/admin/conflicts/stats", get(handlers::conflict_stats))
        .route(
            "/admin/conflicts/{conflict_id}",
            get(handlers::get_conflict),
        )
        .route(
            "/admin/conflicts/{conflict_id}/resolve-db",
            post(handlers::resolve_with_db),
        )
        .route(
            "/admin/conflicts/{conflict_id}/resolve-file",
            post(handlers::resolve_with_file),
        )
        .route(
            "/admin/conflicts/{conflict_id}/ignore",
            post(handlers::ignore_conflict),
        )
        // Device sync
        .route("/sync/status", get(handlers::sync_status))
        .route("/sync/photos", post(handlers::sync_photos))
        .route("/sync/legacy-photos", get(handlers::legacy_photos))
        .route("/sync/claim-legacy", post(handlers::claim_legacy));

    let mut router = Router::new().merge(api_routes);

    // When enabled, this endpoint must be network-restricted to the
    // Prometheus scraper.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        // Auth middleware (validates token and sets AuthenticatedUser extension)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
