// crates/admin/src/routes/pending_jobs.rs
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use datasets_pipeline_common::QueueSnapshot;

use crate::error::ApiResult;
use crate::state::AppState;

/// GET /pending-jobs - waiting and started jobs, one entry per declared job type.
pub async fn pending_jobs(State(state): State<Arc<AppState>>) -> ApiResult<Json<QueueSnapshot>> {
    Ok(Json(state.queue.snapshot()?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/pending-jobs", get(pending_jobs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use datasets_pipeline_common::{JobInfo, JobTypeFilter, ProcessingGraph};
    use serde_json::Value;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_pending_jobs_lists_waiting_and_started() {
        let state = AppState::in_memory(Arc::new(ProcessingGraph::standard().unwrap()));
        state.queue.enqueue(JobInfo::new("dataset-config-names", "a")).unwrap();
        state.queue.enqueue(JobInfo::new("dataset-config-names", "b")).unwrap();
        state.queue.claim("worker-1", &JobTypeFilter::all()).unwrap();

        let app = router().with_state(state);
        let response = app
            .oneshot(Request::builder().uri("/pending-jobs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        let lane = &json["dataset-config-names"];
        assert_eq!(lane["waiting"].as_array().unwrap().len(), 1);
        assert_eq!(lane["waiting"][0]["dataset"], "b");
        assert_eq!(lane["started"][0]["dataset"], "a");
        assert_eq!(lane["started"][0]["worker"], "worker-1");
        assert_eq!(json.as_object().unwrap().len(), 20);
    }
}
