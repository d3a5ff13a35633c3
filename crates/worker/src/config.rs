// crates/worker/src/config.rs
//! Worker settings, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use datasets_pipeline_common::config::{env_list, env_var};
use datasets_pipeline_common::JobTypeFilter;

/// Default idle sleep between two empty claims.
const DEFAULT_SLEEP_SECONDS: u64 = 15;
/// Started jobs older than this are considered abandoned.
const DEFAULT_MAX_JOB_DURATION_SECONDS: u64 = 20 * 60;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identity recorded on started jobs. `WORKER_ID`, random by default.
    pub worker_id: String,
    /// Shared computation cache. `DATASETS_CACHE_DIRECTORY`.
    pub datasets_cache: PathBuf,
    /// Derived assets write directory. `ASSETS_DIRECTORY`.
    pub assets_directory: PathBuf,
    /// Sidecar parquet metadata. `PARQUET_METADATA_DIRECTORY`.
    pub parquet_metadata_directory: PathBuf,
    pub sleep_interval: Duration,
    pub max_job_duration: Duration,
    /// Only claim these job types. Empty means all. `WORKER_JOB_TYPES_ONLY`.
    pub job_types_only: Vec<String>,
    /// Never claim these job types. `WORKER_JOB_TYPES_BLOCKED`.
    pub job_types_blocked: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("datasets-pipeline");
        Self {
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
            datasets_cache: base.join("datasets-cache"),
            assets_directory: base.join("assets"),
            parquet_metadata_directory: base.join("parquet-metadata"),
            sleep_interval: Duration::from_secs(DEFAULT_SLEEP_SECONDS),
            max_job_duration: Duration::from_secs(DEFAULT_MAX_JOB_DURATION_SECONDS),
            job_types_only: Vec::new(),
            job_types_blocked: Vec::new(),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_id: env_var("WORKER_ID").unwrap_or(defaults.worker_id),
            datasets_cache: env_var("DATASETS_CACHE_DIRECTORY").unwrap_or(defaults.datasets_cache),
            assets_directory: env_var("ASSETS_DIRECTORY").unwrap_or(defaults.assets_directory),
            parquet_metadata_directory: env_var("PARQUET_METADATA_DIRECTORY")
                .unwrap_or(defaults.parquet_metadata_directory),
            sleep_interval: env_var("WORKER_SLEEP_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sleep_interval),
            max_job_duration: env_var("WORKER_MAX_JOB_DURATION_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_job_duration),
            job_types_only: env_list("WORKER_JOB_TYPES_ONLY"),
            job_types_blocked: env_list("WORKER_JOB_TYPES_BLOCKED"),
        }
    }

    pub fn job_type_filter(&self) -> JobTypeFilter {
        let filter = JobTypeFilter::all().blocked(self.job_types_blocked.iter().cloned());
        if self.job_types_only.is_empty() {
            filter
        } else {
            filter.only(self.job_types_only.iter().cloned())
        }
    }
}
