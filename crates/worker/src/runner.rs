// crates/worker/src/runner.rs
//! Job runners: the executable unit for one claimed job.
//!
//! A runner is built by the dispatcher with exactly the resources its job
//! type declares. [`JobRunner::process`] decides whether the work is already
//! done, computes it otherwise, and records the result in the cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use datasets_pipeline_common::{
    CacheEntry, CacheError, CacheStatus, CacheStore, JobInfo, JobOutcome, ProcessingGraph,
    ProcessingStep,
};
use serde_json::Value;

use crate::config::WorkerConfig;
use crate::dispatch::Resource;
use crate::error::JobRunnerError;

/// Shared resources handed to a runner at construction.
///
/// Optional fields are only set when the job type's dispatch entry asks for
/// them. The static configuration is always present.
#[derive(Debug, Clone)]
pub struct InjectedResources {
    pub config: Arc<WorkerConfig>,
    pub datasets_cache: Option<PathBuf>,
    pub assets_directory: Option<PathBuf>,
    pub parquet_metadata_directory: Option<PathBuf>,
    pub processing_graph: Option<Arc<ProcessingGraph>>,
}

impl InjectedResources {
    pub fn new(config: Arc<WorkerConfig>) -> Self {
        Self {
            config,
            datasets_cache: None,
            assets_directory: None,
            parquet_metadata_directory: None,
            processing_graph: None,
        }
    }

    pub fn provides(&self, resource: Resource) -> bool {
        match resource {
            Resource::DatasetsCache => self.datasets_cache.is_some(),
            Resource::AssetsDirectory => self.assets_directory.is_some(),
            Resource::ParquetMetadataDirectory => self.parquet_metadata_directory.is_some(),
            Resource::ProcessingGraph => self.processing_graph.is_some(),
        }
    }

    /// The optional resources that were injected, in [`Resource::ALL`] order.
    pub fn injected(&self) -> Vec<Resource> {
        Resource::ALL
            .into_iter()
            .filter(|r| self.provides(*r))
            .collect()
    }
}

/// Successful result of a computation.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub content: Value,
    pub details: Option<Value>,
}

impl JobOutput {
    pub fn new(content: Value) -> Self {
        Self {
            content,
            details: None,
        }
    }
}

/// What a computation sees while it runs.
pub struct RunContext<'a> {
    pub job: &'a JobInfo,
    pub step: &'a ProcessingStep,
    pub resources: &'a InjectedResources,
    pub cache: &'a CacheStore,
}

impl RunContext<'_> {
    pub fn datasets_cache(&self) -> Result<&Path, JobRunnerError> {
        self.require(self.resources.datasets_cache.as_deref(), Resource::DatasetsCache)
    }

    pub fn assets_directory(&self) -> Result<&Path, JobRunnerError> {
        self.require(self.resources.assets_directory.as_deref(), Resource::AssetsDirectory)
    }

    pub fn parquet_metadata_directory(&self) -> Result<&Path, JobRunnerError> {
        self.require(
            self.resources.parquet_metadata_directory.as_deref(),
            Resource::ParquetMetadataDirectory,
        )
    }

    pub fn processing_graph(&self) -> Result<&ProcessingGraph, JobRunnerError> {
        self.require(self.resources.processing_graph.as_deref(), Resource::ProcessingGraph)
    }

    /// Content of a successful upstream response for the same dataset.
    ///
    /// `config` and `split` select the upstream entry's scope, which may be
    /// coarser than the current job's.
    pub fn upstream_content(
        &self,
        kind: &str,
        config: Option<&str>,
        split: Option<&str>,
    ) -> Result<Value, JobRunnerError> {
        let entry = self
            .cache
            .get(kind, &self.job.dataset, config, split)
            .map_err(|e| JobRunnerError::failed("UnexpectedError", e.to_string(), 500))?;
        match entry {
            Some(entry) if entry.status == CacheStatus::Success => Ok(entry.content),
            _ => Err(JobRunnerError::UpstreamMissing {
                kind: kind.to_string(),
            }),
        }
    }

    fn require<'r, T: ?Sized>(
        &self,
        value: Option<&'r T>,
        resource: Resource,
    ) -> Result<&'r T, JobRunnerError> {
        value.ok_or_else(|| JobRunnerError::MissingResource {
            job_type: self.job.job_type.clone(),
            resource,
        })
    }
}

/// The domain computation behind every job type.
///
/// Implementations dispatch on `ctx.step.job_type`. They may read upstream
/// responses through `ctx` but never write to the cache themselves.
pub trait Compute: Send + Sync {
    fn compute(&self, ctx: &RunContext<'_>) -> Result<JobOutput, JobRunnerError>;
}

pub trait JobRunner: Send {
    fn job_info(&self) -> &JobInfo;

    fn processing_step(&self) -> &ProcessingStep;

    fn resources(&self) -> &InjectedResources;

    fn compute(&self, cache: &CacheStore) -> Result<JobOutput, JobRunnerError>;

    /// Whether a cached success already answers this job.
    ///
    /// Forced jobs are never skipped. Otherwise the cached entry must be a
    /// success from the current runner version and the same dataset revision.
    fn should_skip(&self, cache: &CacheStore) -> Result<bool, CacheError> {
        let job = self.job_info();
        if job.force {
            return Ok(false);
        }
        let step = self.processing_step();
        let cached = cache.get(
            &step.cache_kind,
            &job.dataset,
            job.config.as_deref(),
            job.split.as_deref(),
        )?;
        Ok(cached.is_some_and(|entry| {
            entry.status == CacheStatus::Success
                && entry.job_runner_version == Some(step.job_runner_version)
                && entry.dataset_git_revision == job.params.revision
        }))
    }

    /// Run the job end to end and record its result in the cache.
    fn process(&self, cache: &CacheStore) -> Result<JobOutcome, CacheError> {
        let job = self.job_info();
        let step = self.processing_step();
        if self.should_skip(cache)? {
            tracing::info!(job_id = %job.job_id, job_type = %job.job_type, dataset = %job.dataset, "Up-to-date response cached, skipping");
            return Ok(JobOutcome::Skipped);
        }

        let (entry, outcome) = match self.compute(cache) {
            Ok(output) => {
                let mut entry = CacheEntry::success(&step.cache_kind, &job.dataset, output.content);
                entry.details = output.details;
                (entry, JobOutcome::Success)
            }
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, job_type = %job.job_type, dataset = %job.dataset, error_code = e.error_code(), "Job failed: {e}");
                let entry = CacheEntry::error(
                    &step.cache_kind,
                    &job.dataset,
                    e.error_code(),
                    e.to_string(),
                    e.http_status(),
                );
                (entry, JobOutcome::Error)
            }
        };

        cache.upsert(
            entry
                .with_scope(job.config.clone(), job.split.clone())
                .with_job_runner_version(step.job_runner_version)
                .with_revision(job.params.revision.clone()),
        )?;
        Ok(outcome)
    }
}

/// The production runner: one per claimed job, delegating to a [`Compute`].
pub struct StepJobRunner {
    job: JobInfo,
    step: ProcessingStep,
    resources: InjectedResources,
    compute: Arc<dyn Compute>,
}

impl StepJobRunner {
    pub fn new(
        job: JobInfo,
        step: ProcessingStep,
        resources: InjectedResources,
        compute: Arc<dyn Compute>,
    ) -> Self {
        Self {
            job,
            step,
            resources,
            compute,
        }
    }
}

impl JobRunner for StepJobRunner {
    fn job_info(&self) -> &JobInfo {
        &self.job
    }

    fn processing_step(&self) -> &ProcessingStep {
        &self.step
    }

    fn resources(&self) -> &InjectedResources {
        &self.resources
    }

    fn compute(&self, cache: &CacheStore) -> Result<JobOutput, JobRunnerError> {
        let ctx = RunContext {
            job: &self.job,
            step: &self.step,
            resources: &self.resources,
            cache,
        };
        self.compute.compute(&ctx)
    }
}
