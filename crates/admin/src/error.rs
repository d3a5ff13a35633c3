// crates/admin/src/error.rs
use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use datasets_pipeline_common::{CacheError, QueueError, StepNotFound};
use serde::Serialize;
use thiserror::Error;

/// Header carrying the machine-readable error code on every error response.
pub const ERROR_CODE_HEADER: HeaderName = HeaderName::from_static("x-error-code");

/// Structured JSON error response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Not found")]
    NotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidParameter(_) => "InvalidParameter",
            ApiError::NotFound => "NotFound",
            ApiError::MethodNotAllowed => "MethodNotAllowed",
            ApiError::Unexpected(_) => "UnexpectedError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidParameter(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            ApiError::InvalidParameter(msg) => {
                tracing::warn!(message = %msg, "Invalid parameter");
                ErrorResponse::new(msg.clone())
            }
            ApiError::NotFound => {
                tracing::debug!("Route not found");
                ErrorResponse::new("Not Found")
            }
            ApiError::MethodNotAllowed => ErrorResponse::new("Method Not Allowed"),
            ApiError::Unexpected(msg) => {
                tracing::error!(message = %msg, "Unexpected error");
                ErrorResponse::with_details("Unexpected error.", msg.clone())
            }
        };

        let mut response = (self.status(), Json(body)).into_response();
        response
            .headers_mut()
            .insert(ERROR_CODE_HEADER, HeaderValue::from_static(self.code()));
        response
    }
}

impl From<StepNotFound> for ApiError {
    fn from(e: StepNotFound) -> Self {
        ApiError::InvalidParameter(e.to_string())
    }
}

impl From<CacheError> for ApiError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::InvalidCursor(_) => ApiError::InvalidParameter("Invalid cursor.".to_string()),
            CacheError::Store(e) => ApiError::Unexpected(e.to_string()),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::UnknownJobType(e) => e.into(),
            e @ (QueueError::InvalidScope { .. } | QueueError::DuplicateJobId(_)) => {
                ApiError::InvalidParameter(e.to_string())
            }
            QueueError::Store(e) => ApiError::Unexpected(e.to_string()),
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use datasets_pipeline_common::StoreError;

    async fn extract_response(response: Response) -> (StatusCode, Option<String>, ErrorResponse) {
        let status = response.status();
        let code = response
            .headers()
            .get(ERROR_CODE_HEADER)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error_response: ErrorResponse = serde_json::from_slice(&body).unwrap();
        (status, code, error_response)
    }

    #[tokio::test]
    async fn test_invalid_parameter_returns_422() {
        let response = ApiError::InvalidParameter("Parameter 'dataset' is required".into()).into_response();
        let (status, code, body) = extract_response(response).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(code.as_deref(), Some("InvalidParameter"));
        assert_eq!(body.error, "Parameter 'dataset' is required");
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_invalid_cursor_maps_to_invalid_parameter() {
        let err: ApiError = CacheError::InvalidCursor("bad".into()).into();
        let (status, code, _) = extract_response(err.into_response()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(code.as_deref(), Some("InvalidParameter"));
    }

    #[tokio::test]
    async fn test_store_failure_returns_500() {
        let err: ApiError = CacheError::Store(StoreError::Unavailable("poisoned".into())).into();
        let (status, code, body) = extract_response(err.into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code.as_deref(), Some("UnexpectedError"));
        assert_eq!(body.error, "Unexpected error.");
        assert!(body.details.unwrap().contains("poisoned"));
    }

    #[tokio::test]
    async fn test_not_found_returns_404() {
        let (status, code, body) = extract_response(ApiError::NotFound.into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code.as_deref(), Some("NotFound"));
        assert_eq!(body.error, "Not Found");
    }

    #[tokio::test]
    async fn test_method_not_allowed_returns_405() {
        let (status, code, body) = extract_response(ApiError::MethodNotAllowed.into_response()).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(code.as_deref(), Some("MethodNotAllowed"));
        assert_eq!(body.error, "Method Not Allowed");
    }

    #[test]
    fn test_duplicate_job_id_is_client_error() {
        let err: ApiError = QueueError::DuplicateJobId("same".into()).into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_unknown_job_type_is_client_error() {
        let err: ApiError = QueueError::UnknownJobType(StepNotFound {
            lookup: "job type",
            name: "x".into(),
            valid: vec!["a".into()],
        })
        .into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
