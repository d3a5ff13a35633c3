// crates/worker/src/error.rs
use datasets_pipeline_common::{CacheError, QueueError};
use thiserror::Error;

use crate::dispatch::Resource;

/// The dispatcher was handed a job type it cannot build a runner for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Unsupported job type: '{job_type}'. The supported job types are: {}", .supported.join(", "))]
    UnsupportedJobType {
        job_type: String,
        supported: Vec<String>,
    },
}

/// A job runner failed to produce a result.
///
/// Every variant ends up as an error entry in the cache, so each one knows
/// its error code and HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobRunnerError {
    #[error("{message}")]
    Failed {
        error_code: String,
        message: String,
        http_status: u16,
    },

    #[error("Job runner for '{job_type}' was built without the {resource} resource")]
    MissingResource { job_type: String, resource: Resource },

    #[error("Required upstream response '{kind}' is missing or failed")]
    UpstreamMissing { kind: String },
}

impl JobRunnerError {
    pub fn failed(error_code: impl Into<String>, message: impl Into<String>, http_status: u16) -> Self {
        JobRunnerError::Failed {
            error_code: error_code.into(),
            message: message.into(),
            http_status,
        }
    }

    pub fn error_code(&self) -> &str {
        match self {
            JobRunnerError::Failed { error_code, .. } => error_code,
            JobRunnerError::MissingResource { .. } => "UnexpectedError",
            JobRunnerError::UpstreamMissing { .. } => "PreviousStepError",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            JobRunnerError::Failed { http_status, .. } => *http_status,
            JobRunnerError::MissingResource { .. } => 500,
            JobRunnerError::UpstreamMissing { .. } => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}
