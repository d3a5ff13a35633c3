// crates/admin/src/metrics.rs
//! Prometheus metrics for the admin service.
//!
//! Request counters and latencies are recorded by [`track_requests`], labelled
//! with the matched route template so path parameters do not explode
//! cardinality.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const UNMATCHED_PATH: &str = "unmatched";

/// Install the Prometheus recorder.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }
    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();
    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!("admin_requests_total", "Total number of admin API requests");
    describe_histogram!(
        "admin_request_duration_seconds",
        "Duration of admin API requests in seconds"
    );
    describe_gauge!("admin_uptime_seconds", "Seconds since the admin service started");
    describe_gauge!("queue_jobs", "Active jobs by job type and state");
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_request(method: &str, path_template: &str, status: u16, duration: Duration) {
    counter!(
        "admin_requests_total",
        "method" => method.to_string(),
        "path_template" => path_template.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "admin_request_duration_seconds",
        "method" => method.to_string(),
        "path_template" => path_template.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Middleware recording one counter increment and one latency sample per request.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| UNMATCHED_PATH.to_string(), |p| p.as_str().to_string());

    let response = next.run(request).await;
    record_request(&method, &path, response.status().as_u16(), start.elapsed());
    response
}
