// crates/common/src/status.rs
//! Per-dataset view across the cache and the queue.

use indexmap::IndexMap;
use serde::Serialize;

use crate::cache::{CacheReport, CacheStore};
use crate::graph::{ProcessingGraph, ProcessingStep};
use crate::queue::{JobQueue, QueuedJob};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepStatus {
    pub cached_responses: Vec<CacheReport>,
    pub jobs: Vec<QueuedJob>,
    /// Set when this step's data could not be read. Other steps are unaffected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status of one dataset, keyed by job type in graph order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DatasetStatus(pub IndexMap<String, StepStatus>);

impl DatasetStatus {
    pub fn get(&self, job_type: &str) -> Option<&StepStatus> {
        self.0.get(job_type)
    }
}

/// Gather cache entries and active jobs of `dataset` for every job type.
///
/// A dataset nobody has heard of still gets one (empty) record per job type.
pub fn dataset_status(
    graph: &ProcessingGraph,
    queue: &JobQueue,
    cache: &CacheStore,
    dataset: &str,
) -> DatasetStatus {
    DatasetStatus(
        graph
            .steps()
            .iter()
            .map(|step| (step.job_type.clone(), step_status(step, queue, cache, dataset)))
            .collect(),
    )
}

fn step_status(step: &ProcessingStep, queue: &JobQueue, cache: &CacheStore, dataset: &str) -> StepStatus {
    let mut status = StepStatus::default();
    let mut errors = Vec::new();

    match cache.dataset_entries(&step.cache_kind, dataset) {
        Ok(entries) => {
            status.cached_responses = entries.iter().map(|e| e.to_report()).collect();
        }
        Err(e) => {
            tracing::error!(job_type = %step.job_type, dataset, "Failed to read cached responses: {e}");
            errors.push(e.to_string());
        }
    }
    match queue.dataset_jobs(&step.job_type, dataset) {
        Ok(jobs) => status.jobs = jobs,
        Err(e) => {
            tracing::error!(job_type = %step.job_type, dataset, "Failed to read queued jobs: {e}");
            errors.push(e.to_string());
        }
    }

    if !errors.is_empty() {
        status.error = Some(errors.join("; "));
    }
    status
}
