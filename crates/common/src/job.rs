// crates/common/src/job.rs
//! Units of work handed from the queue to the workers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identifier of a queued job.
pub type JobId = String;

/// Scheduling priority. Lower sorts first and is served first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

/// Identity of a unit of work. At most one job per key is active in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobKey {
    pub job_type: String,
    pub dataset: String,
    pub config: Option<String>,
    pub split: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    /// Dataset git revision the job must compute against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Free-form parameters passed through to the job runner.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// A request for one unit of computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: JobId,
    pub job_type: String,
    pub dataset: String,
    pub config: Option<String>,
    pub split: Option<String>,
    #[serde(default)]
    pub params: JobParams,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub force: bool,
}

impl JobInfo {
    /// Create a dataset-scoped request with a fresh job id.
    pub fn new(job_type: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            job_type: job_type.into(),
            dataset: dataset.into(),
            config: None,
            split: None,
            params: JobParams::default(),
            priority: Priority::default(),
            force: false,
        }
    }

    pub fn with_config(mut self, config: impl Into<String>) -> Self {
        self.config = Some(config.into());
        self
    }

    pub fn with_split(mut self, split: impl Into<String>) -> Self {
        self.split = Some(split.into());
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.params.revision = Some(revision.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn key(&self) -> JobKey {
        JobKey {
            job_type: self.job_type.clone(),
            dataset: self.dataset.clone(),
            config: self.config.clone(),
            split: self.split.clone(),
        }
    }
}

/// How a started job ended, as reported to [`crate::queue::JobQueue::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    Success,
    Error,
    /// An up-to-date result was already cached; nothing was computed.
    Skipped,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Success => "success",
            JobOutcome::Error => "error",
            JobOutcome::Skipped => "skipped",
        }
    }
}
