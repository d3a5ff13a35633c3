// crates/admin/src/routes/health.rs
use std::sync::Arc;

use axum::{routing::get, Router};

use crate::state::AppState;

/// GET /healthcheck - plain-text liveness probe.
pub async fn healthcheck() -> &'static str {
    "ok"
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/healthcheck", get(healthcheck))
}
