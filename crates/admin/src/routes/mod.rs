// crates/admin/src/routes/mod.rs
//! Admin route handlers.

pub mod cache_reports;
pub mod dataset_status;
pub mod health;
pub mod metrics;
pub mod pending_jobs;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined admin router.
///
/// Routes:
/// - GET /healthcheck - Liveness probe
/// - GET /metrics - Prometheus metrics
/// - GET /pending-jobs - Waiting and started jobs for every job type
/// - GET /dataset-status?dataset=<name> - Cached responses and jobs of one dataset
/// - GET /cache-reports/{cache_kind}?cursor=<token> - Paginated entry metadata
/// - GET /cache-reports-with-content/{cache_kind}?cursor=<token> - Same, with content
pub fn admin_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(metrics::router())
        .merge(pending_jobs::router())
        .merge(dataset_status::router())
        .merge(cache_reports::router())
        .with_state(state)
}
