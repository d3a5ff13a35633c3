// crates/worker/src/factory.rs
use std::sync::Arc;

use datasets_pipeline_common::{ConfigurationError, JobInfo, ProcessingGraph};

use crate::config::WorkerConfig;
use crate::dispatch::{DispatchEntry, DispatchTable, Resource, RunnerParts};
use crate::error::DispatchError;
use crate::runner::{Compute, InjectedResources, JobRunner};

/// Builds the runner for a claimed job.
pub trait JobRunnerDispatcher: Send + Sync {
    fn create(&self, job: JobInfo) -> Result<Box<dyn JobRunner>, DispatchError>;
}

/// The production dispatcher, backed by a validated [`DispatchTable`].
pub struct JobRunnerFactory {
    graph: Arc<ProcessingGraph>,
    table: DispatchTable,
    config: Arc<WorkerConfig>,
    compute: Arc<dyn Compute>,
}

impl JobRunnerFactory {
    /// Fails if the table and the graph disagree on the set of job types.
    pub fn new(
        graph: Arc<ProcessingGraph>,
        table: DispatchTable,
        config: Arc<WorkerConfig>,
        compute: Arc<dyn Compute>,
    ) -> Result<Self, ConfigurationError> {
        table.validate(&graph)?;
        Ok(Self {
            graph,
            table,
            config,
            compute,
        })
    }

    /// Every job type this factory builds runners for, in graph order.
    pub fn supported_job_types(&self) -> Vec<String> {
        self.graph.job_types().map(str::to_string).collect()
    }

    fn unsupported(&self, job_type: &str) -> DispatchError {
        DispatchError::UnsupportedJobType {
            job_type: job_type.to_string(),
            supported: self.supported_job_types(),
        }
    }

    fn resources_for(&self, entry: &DispatchEntry) -> InjectedResources {
        let mut resources = InjectedResources::new(Arc::clone(&self.config));
        for resource in entry.resources {
            match resource {
                Resource::DatasetsCache => {
                    resources.datasets_cache = Some(self.config.datasets_cache.clone());
                }
                Resource::AssetsDirectory => {
                    resources.assets_directory = Some(self.config.assets_directory.clone());
                }
                Resource::ParquetMetadataDirectory => {
                    resources.parquet_metadata_directory =
                        Some(self.config.parquet_metadata_directory.clone());
                }
                Resource::ProcessingGraph => {
                    resources.processing_graph = Some(Arc::clone(&self.graph));
                }
            }
        }
        resources
    }
}

impl JobRunnerDispatcher for JobRunnerFactory {
    fn create(&self, job: JobInfo) -> Result<Box<dyn JobRunner>, DispatchError> {
        let step = self
            .graph
            .step_by_job_type(&job.job_type)
            .map_err(|_| self.unsupported(&job.job_type))?;
        let Some(entry) = self.table.entry(&job.job_type) else {
            // unreachable after validate(), kept as a typed failure
            tracing::error!(job_type = %job.job_type, "No dispatch entry for declared job type");
            return Err(self.unsupported(&job.job_type));
        };
        let parts = RunnerParts {
            step: step.clone(),
            resources: self.resources_for(entry),
            compute: Arc::clone(&self.compute),
            job,
        };
        Ok((entry.build)(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobRunnerError;
    use crate::runner::{JobOutput, RunContext};
    use datasets_pipeline_common::{Granularity, StepSpecification};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Noop;

    impl Compute for Noop {
        fn compute(&self, _ctx: &RunContext<'_>) -> Result<JobOutput, JobRunnerError> {
            Ok(JobOutput::new(json!({})))
        }
    }

    fn factory() -> JobRunnerFactory {
        JobRunnerFactory::new(
            Arc::new(ProcessingGraph::standard().unwrap()),
            DispatchTable::standard(),
            Arc::new(WorkerConfig::default()),
            Arc::new(Noop),
        )
        .unwrap()
    }

    #[test]
    fn test_create_injects_declared_resources() {
        let factory = factory();
        let cases: &[(&str, &[Resource])] = &[
            ("dataset-config-names", &[Resource::DatasetsCache]),
            ("config-parquet", &[]),
            ("config-parquet-metadata", &[Resource::ParquetMetadataDirectory]),
            (
                "split-first-rows-from-streaming",
                &[Resource::DatasetsCache, Resource::AssetsDirectory],
            ),
            (
                "split-first-rows-from-parquet",
                &[
                    Resource::AssetsDirectory,
                    Resource::ParquetMetadataDirectory,
                    Resource::ProcessingGraph,
                ],
            ),
        ];
        for (job_type, expected) in cases {
            let runner = factory.create(JobInfo::new(*job_type, "ds")).unwrap();
            assert_eq!(runner.processing_step().job_type, *job_type);
            assert_eq!(runner.resources().injected(), expected.to_vec(), "{job_type}");
        }
    }

    #[test]
    fn test_every_standard_job_type_is_creatable() {
        let factory = factory();
        for job_type in factory.supported_job_types() {
            let runner = factory.create(JobInfo::new(job_type.clone(), "ds")).unwrap();
            assert_eq!(runner.job_info().job_type, job_type);
        }
    }

    #[test]
    fn test_unknown_job_type_lists_supported_types() {
        let factory = factory();
        let err = factory.create(JobInfo::new("not-a-type", "ds")).err().unwrap();
        let DispatchError::UnsupportedJobType { job_type, supported } = err;
        assert_eq!(job_type, "not-a-type");
        assert_eq!(supported.len(), 20);
        assert_eq!(supported[0], "dataset-config-names");
    }

    #[test]
    fn test_factory_rejects_incomplete_table() {
        let graph = ProcessingGraph::new([
            StepSpecification::new("a", Granularity::Dataset),
            StepSpecification::new("b", Granularity::Dataset),
        ])
        .unwrap();
        let result = JobRunnerFactory::new(
            Arc::new(graph),
            DispatchTable::new().register("a", &[]),
            Arc::new(WorkerConfig::default()),
            Arc::new(Noop),
        );
        assert_eq!(
            result.err(),
            Some(ConfigurationError::MissingDispatchEntry("b".into()))
        );
    }
}
