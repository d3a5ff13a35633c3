// crates/admin/src/routes/cache_reports.rs
//! Cursor-paginated listings of one cache kind.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use datasets_pipeline_common::{CacheReport, CacheReportWithContent};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::extract::{ApiPath, ApiQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CursorQuery {
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CacheReportsResponse {
    pub cache_reports: Vec<CacheReport>,
    pub next_cursor: String,
}

#[derive(Debug, Serialize)]
pub struct CacheReportsWithContentResponse {
    pub cache_reports_with_content: Vec<CacheReportWithContent>,
    pub next_cursor: String,
}

/// GET /cache-reports/{cache_kind}?cursor=<token>
pub async fn cache_reports(
    State(state): State<Arc<AppState>>,
    ApiPath(cache_kind): ApiPath<String>,
    ApiQuery(query): ApiQuery<CursorQuery>,
) -> ApiResult<Json<CacheReportsResponse>> {
    // path segments come from the caller: unknown kinds are a client error
    state.graph.step_by_cache_kind(&cache_kind)?;
    let page = state.cache.list_reports(
        &cache_kind,
        query.cursor.as_deref(),
        state.config.cache_reports_num_results,
    )?;
    Ok(Json(CacheReportsResponse {
        cache_reports: page.reports,
        next_cursor: page.next_cursor,
    }))
}

/// GET /cache-reports-with-content/{cache_kind}?cursor=<token>
pub async fn cache_reports_with_content(
    State(state): State<Arc<AppState>>,
    ApiPath(cache_kind): ApiPath<String>,
    ApiQuery(query): ApiQuery<CursorQuery>,
) -> ApiResult<Json<CacheReportsWithContentResponse>> {
    state.graph.step_by_cache_kind(&cache_kind)?;
    let page = state.cache.list_reports_with_content(
        &cache_kind,
        query.cursor.as_deref(),
        state.config.cache_reports_with_content_num_results,
    )?;
    Ok(Json(CacheReportsWithContentResponse {
        cache_reports_with_content: page.reports,
        next_cursor: page.next_cursor,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cache-reports/{cache_kind}", get(cache_reports))
        .route(
            "/cache-reports-with-content/{cache_kind}",
            get(cache_reports_with_content),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdminConfig;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use datasets_pipeline_common::{CacheEntry, CacheStore, JobQueue, ProcessingGraph};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn state(page_size: usize) -> Arc<AppState> {
        let graph = Arc::new(ProcessingGraph::standard().unwrap());
        let cache = Arc::new(CacheStore::new());
        for i in 0..5 {
            cache
                .upsert(CacheEntry::success("config-size", format!("ds-{i}"), json!({ "size": i })))
                .unwrap();
        }
        AppState::new(
            Arc::clone(&graph),
            Arc::new(JobQueue::new(graph)),
            cache,
            AdminConfig {
                cache_reports_num_results: 2,
                cache_reports_with_content_num_results: 3,
                ..AdminConfig::default()
            },
        )
    }

    async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        let response = router()
            .with_state(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_follow_cursor_to_the_end() {
        let state = state(2);
        let mut datasets = Vec::new();
        let mut uri = "/cache-reports/config-size".to_string();
        loop {
            let (status, body) = get(Arc::clone(&state), &uri).await;
            assert_eq!(status, StatusCode::OK);
            for report in body["cache_reports"].as_array().unwrap() {
                assert!(report.get("content").is_none());
                datasets.push(report["dataset"].as_str().unwrap().to_string());
            }
            let next = body["next_cursor"].as_str().unwrap();
            if next.is_empty() {
                break;
            }
            uri = format!("/cache-reports/config-size?cursor={next}");
        }
        assert_eq!(datasets, vec!["ds-0", "ds-1", "ds-2", "ds-3", "ds-4"]);
    }

    #[tokio::test]
    async fn test_with_content_uses_its_own_page_size() {
        let (status, body) = get(state(2), "/cache-reports-with-content/config-size").await;
        assert_eq!(status, StatusCode::OK);
        let reports = body["cache_reports_with_content"].as_array().unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0]["content"], json!({ "size": 0 }));
        assert!(!body["next_cursor"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_cache_kind_is_invalid_parameter() {
        let (status, body) = get(state(2), "/cache-reports/not-a-kind").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("not-a-kind"));
    }
}
