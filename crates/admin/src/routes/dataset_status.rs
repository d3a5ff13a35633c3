// crates/admin/src/routes/dataset_status.rs
use std::sync::Arc;

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use datasets_pipeline_common::{dataset_status as gather_status, DatasetStatus};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DatasetStatusQuery {
    pub dataset: Option<String>,
}

/// GET /dataset-status?dataset=<name> - cached responses and active jobs of a
/// dataset, for every job type.
pub async fn dataset_status(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<DatasetStatusQuery>,
) -> ApiResult<Json<DatasetStatus>> {
    let dataset = query
        .dataset
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::InvalidParameter("Parameter 'dataset' is required".to_string()))?;
    Ok(Json(gather_status(&state.graph, &state.queue, &state.cache, &dataset)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/dataset-status", get(dataset_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use datasets_pipeline_common::{CacheEntry, JobInfo, ProcessingGraph};
    use serde_json::{json, Value};
    use tower::ServiceExt;

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
    async fn test_empty_dataset_parameter_is_rejected() {
        let state = AppState::in_memory(Arc::new(ProcessingGraph::standard().unwrap()));
        let (status, body) = get(state, "/dataset-status?dataset=").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_dataset_status_reports_entries_and_jobs() {
        let state = AppState::in_memory(Arc::new(ProcessingGraph::standard().unwrap()));
        state
            .cache
            .upsert(CacheEntry::success("dataset-config-names", "squad", json!({ "config_names": [] })))
            .unwrap();
        state
            .queue
            .enqueue(JobInfo::new("config-size", "squad").with_config("plain_text"))
            .unwrap();

        let (status, body) = get(state, "/dataset-status?dataset=squad").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dataset-config-names"]["cached_responses"][0]["dataset"], "squad");
        assert_eq!(body["dataset-config-names"]["jobs"], json!([]));
        assert_eq!(body["config-size"]["jobs"][0]["config"], "plain_text");
        assert_eq!(body["config-size"]["cached_responses"], json!([]));
    }
}
