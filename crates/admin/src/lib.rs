// crates/admin/src/lib.rs
//! Admin service of the dataset processing pipeline.
//!
//! Read-only HTTP views over the job queue and the cache store, plus health
//! and Prometheus endpoints.

pub mod config;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::AdminConfig;
pub use error::*;
pub use crate::metrics::{init_metrics, render_metrics};
pub use routes::admin_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{middleware, Router};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Give error responses produced outside the handlers (405s from method
/// routing, rejections of plain axum extractors) the `X-Error-Code` header and
/// JSON body every handler error carries.
async fn normalize_error_response(response: Response) -> Response {
    let status = response.status();
    let is_error = status.is_client_error() || status.is_server_error();
    if !is_error || response.headers().contains_key(ERROR_CODE_HEADER) {
        return response;
    }

    let reason = status.canonical_reason().unwrap_or("Error").to_string();
    let error = match status {
        StatusCode::NOT_FOUND => ApiError::NotFound,
        StatusCode::METHOD_NOT_ALLOWED => ApiError::MethodNotAllowed,
        s if s.is_client_error() => ApiError::InvalidParameter(reason),
        _ => ApiError::Unexpected(reason),
    };
    let allow = response.headers().get(header::ALLOW).cloned();
    let mut normalized = error.into_response();
    if let Some(allow) = allow {
        normalized.headers_mut().insert(header::ALLOW, allow);
    }
    normalized
}

/// Create the Axum application with all routes and middleware.
///
/// CORS mirrors the caller's origin, method and headers so credentialed
/// requests from any origin are accepted.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    admin_routes(state)
        .route_layer(middleware::from_fn(crate::metrics::track_requests))
        .fallback(not_found)
        .layer(middleware::map_response(normalize_error_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
