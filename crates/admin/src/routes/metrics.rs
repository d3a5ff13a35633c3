// crates/admin/src/routes/metrics.rs
//! Prometheus metrics endpoint.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics::gauge;

use crate::metrics::render_metrics;
use crate::state::AppState;

/// Refresh the gauges derived from current state.
fn update_gauges(state: &AppState) {
    gauge!("admin_uptime_seconds").set(state.uptime_secs() as f64);
    match state.queue.snapshot() {
        Ok(snapshot) => {
            for (job_type, jobs) in snapshot.0 {
                gauge!("queue_jobs", "job_type" => job_type.clone(), "state" => "waiting")
                    .set(jobs.waiting.len() as f64);
                gauge!("queue_jobs", "job_type" => job_type, "state" => "started")
                    .set(jobs.started.len() as f64);
            }
        }
        Err(e) => tracing::warn!("Skipping queue gauges: {e}"),
    }
}

/// GET /metrics - Prometheus text format.
///
/// Returns 503 Service Unavailable if metrics are not initialized.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    update_gauges(&state);
    match render_metrics() {
        Some(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized").into_response(),
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(metrics_handler))
}
