// crates/worker/src/dispatch.rs
//! Dispatch table: job type -> declared resources + runner builder.
//!
//! Populated once at startup and checked against the processing graph, so a
//! job type without a builder is a startup failure rather than a runtime one.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use datasets_pipeline_common::{ConfigurationError, JobInfo, ProcessingGraph, ProcessingStep};
use indexmap::IndexMap;

use crate::runner::{Compute, InjectedResources, JobRunner, StepJobRunner};

/// An optional shared resource a runner may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    DatasetsCache,
    AssetsDirectory,
    ParquetMetadataDirectory,
    ProcessingGraph,
}

impl Resource {
    pub const ALL: [Resource; 4] = [
        Resource::DatasetsCache,
        Resource::AssetsDirectory,
        Resource::ParquetMetadataDirectory,
        Resource::ProcessingGraph,
    ];
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::DatasetsCache => "datasets cache",
            Resource::AssetsDirectory => "assets directory",
            Resource::ParquetMetadataDirectory => "parquet metadata directory",
            Resource::ProcessingGraph => "processing graph",
        };
        f.write_str(name)
    }
}

/// Everything a builder needs to assemble a runner.
pub struct RunnerParts {
    pub job: JobInfo,
    pub step: ProcessingStep,
    pub resources: InjectedResources,
    pub compute: Arc<dyn Compute>,
}

pub type RunnerBuilder = fn(RunnerParts) -> Box<dyn JobRunner>;

fn build_step_runner(parts: RunnerParts) -> Box<dyn JobRunner> {
    Box::new(StepJobRunner::new(
        parts.job,
        parts.step,
        parts.resources,
        parts.compute,
    ))
}

#[derive(Clone, Copy)]
pub struct DispatchEntry {
    pub resources: &'static [Resource],
    pub build: RunnerBuilder,
}

impl fmt::Debug for DispatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEntry")
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct DispatchTable {
    entries: IndexMap<String, DispatchEntry>,
    /// Job types registered more than once; reported by [`DispatchTable::validate`].
    duplicates: Vec<String>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job type served by [`StepJobRunner`].
    pub fn register(self, job_type: impl Into<String>, resources: &'static [Resource]) -> Self {
        self.register_with(job_type, resources, build_step_runner)
    }

    pub fn register_with(
        mut self,
        job_type: impl Into<String>,
        resources: &'static [Resource],
        build: RunnerBuilder,
    ) -> Self {
        let job_type = job_type.into();
        if self.entries.contains_key(&job_type) {
            self.duplicates.push(job_type);
        } else {
            self.entries.insert(job_type, DispatchEntry { resources, build });
        }
        self
    }

    /// Resource needs of the twenty production job types.
    pub fn standard() -> Self {
        use Resource::{AssetsDirectory, DatasetsCache, ParquetMetadataDirectory};

        Self::new()
            .register("dataset-config-names", &[DatasetsCache])
            .register("config-split-names-from-streaming", &[DatasetsCache])
            .register("split-first-rows-from-streaming", &[DatasetsCache, AssetsDirectory])
            .register("config-parquet-and-info", &[DatasetsCache])
            .register("config-parquet", &[])
            .register("config-parquet-metadata", &[ParquetMetadataDirectory])
            .register(
                "split-first-rows-from-parquet",
                &[AssetsDirectory, ParquetMetadataDirectory, Resource::ProcessingGraph],
            )
            .register("dataset-parquet", &[])
            .register("config-info", &[])
            .register("dataset-info", &[])
            .register("config-split-names-from-info", &[])
            .register("config-size", &[])
            .register("dataset-size", &[])
            .register("dataset-split-names", &[])
            .register("dataset-is-valid", &[])
            .register("split-image-url-columns", &[])
            .register("split-opt-in-out-urls-scan", &[DatasetsCache])
            .register("split-opt-in-out-urls-count", &[])
            .register("config-opt-in-out-urls-count", &[])
            .register("dataset-opt-in-out-urls-count", &[])
    }

    pub fn entry(&self, job_type: &str) -> Option<&DispatchEntry> {
        self.entries.get(job_type)
    }

    pub fn job_types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that the table and the graph name exactly the same job types.
    pub fn validate(&self, graph: &ProcessingGraph) -> Result<(), ConfigurationError> {
        if let Some(job_type) = self.duplicates.first() {
            return Err(ConfigurationError::DuplicateDispatchEntry(job_type.clone()));
        }
        let declared: HashSet<&str> = graph.job_types().collect();
        if let Some(missing) = graph.job_types().find(|t| !self.entries.contains_key(*t)) {
            return Err(ConfigurationError::MissingDispatchEntry(missing.to_string()));
        }
        if let Some(unknown) = self.job_types().find(|t| !declared.contains(t)) {
            return Err(ConfigurationError::UnknownDispatchEntry(unknown.to_string()));
        }
        Ok(())
    }
}
