// crates/common/src/specification.rs
//! Declarative description of the processing graph.
//!
//! A specification is an ordered list of steps. It can be written in TOML:
//!
//! ```toml
//! [[steps]]
//! job_type = "dataset-config-names"
//! input_type = "dataset"
//!
//! [[steps]]
//! job_type = "config-size"
//! input_type = "config"
//! triggered_by = ["config-parquet-and-info"]
//! job_runner_version = 2
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::graph::Granularity;

fn default_job_runner_version() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpecification {
    pub job_type: String,
    pub input_type: Granularity,
    #[serde(default)]
    pub triggered_by: Vec<String>,
    /// Defaults to the job type.
    #[serde(default)]
    pub cache_kind: Option<String>,
    #[serde(default = "default_job_runner_version")]
    pub job_runner_version: u32,
}

impl StepSpecification {
    pub fn new(job_type: impl Into<String>, input_type: Granularity) -> Self {
        Self {
            job_type: job_type.into(),
            input_type,
            triggered_by: Vec::new(),
            cache_kind: None,
            job_runner_version: default_job_runner_version(),
        }
    }

    pub fn triggered_by<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggered_by = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn cache_kind(mut self, cache_kind: impl Into<String>) -> Self {
        self.cache_kind = Some(cache_kind.into());
        self
    }

    pub fn job_runner_version(mut self, version: u32) -> Self {
        self.job_runner_version = version;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphSpecification {
    #[serde(default)]
    pub steps: Vec<StepSpecification>,
}

impl GraphSpecification {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(input).map_err(|e| ConfigurationError::Specification(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let input = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::Specification(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&input)
    }

    /// The production pipeline: twenty job types from config discovery down to
    /// URL scanning.
    pub fn standard() -> Self {
        use Granularity::{Config, Dataset, Split};

        let step = |job_type: &str, input_type, version, parents: &[&str]| {
            StepSpecification::new(job_type, input_type)
                .triggered_by(parents.iter().copied())
                .job_runner_version(version)
        };

        Self {
            steps: vec![
                step("dataset-config-names", Dataset, 1, &[]),
                step(
                    "config-split-names-from-streaming",
                    Config,
                    3,
                    &["dataset-config-names"],
                ),
                step(
                    "split-first-rows-from-streaming",
                    Split,
                    3,
                    &[
                        "config-split-names-from-streaming",
                        "config-split-names-from-info",
                    ],
                ),
                step("config-parquet-and-info", Config, 3, &["dataset-config-names"]),
                step("config-parquet", Config, 5, &["config-parquet-and-info"]),
                step("config-parquet-metadata", Config, 1, &["config-parquet"]),
                step(
                    "split-first-rows-from-parquet",
                    Split,
                    2,
                    &["config-parquet-metadata"],
                ),
                step(
                    "dataset-parquet",
                    Dataset,
                    5,
                    &["config-parquet", "dataset-config-names"],
                ),
                step("config-info", Config, 2, &["config-parquet-and-info"]),
                step(
                    "dataset-info",
                    Dataset,
                    2,
                    &["config-info", "dataset-config-names"],
                ),
                step("config-split-names-from-info", Config, 3, &["config-info"]),
                step("config-size", Config, 2, &["config-parquet-and-info"]),
                step(
                    "dataset-size",
                    Dataset,
                    2,
                    &["config-size", "dataset-config-names"],
                ),
                step(
                    "dataset-split-names",
                    Dataset,
                    3,
                    &[
                        "config-split-names-from-info",
                        "config-split-names-from-streaming",
                        "dataset-config-names",
                    ],
                ),
                step(
                    "dataset-is-valid",
                    Dataset,
                    3,
                    &[
                        "split-first-rows-from-parquet",
                        "split-first-rows-from-streaming",
                    ],
                ),
                step(
                    "split-image-url-columns",
                    Split,
                    1,
                    &[
                        "split-first-rows-from-streaming",
                        "split-first-rows-from-parquet",
                    ],
                ),
                step(
                    "split-opt-in-out-urls-scan",
                    Split,
                    4,
                    &["split-image-url-columns"],
                ),
                step(
                    "split-opt-in-out-urls-count",
                    Split,
                    2,
                    &["split-opt-in-out-urls-scan"],
                ),
                step(
                    "config-opt-in-out-urls-count",
                    Config,
                    3,
                    &[
                        "config-split-names-from-streaming",
                        "config-split-names-from-info",
                        "split-opt-in-out-urls-count",
                    ],
                ),
                step(
                    "dataset-opt-in-out-urls-count",
                    Dataset,
                    2,
                    &["dataset-config-names", "config-opt-in-out-urls-count"],
                ),
            ],
        }
    }
}
