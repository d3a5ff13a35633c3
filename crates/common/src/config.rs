// crates/common/src/config.rs
//! Environment-driven settings shared by the worker and admin binaries.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigurationError;
use crate::graph::ProcessingGraph;
use crate::specification::GraphSpecification;

/// Read and parse an environment variable. Unset, empty or unparsable values
/// are treated as absent; an unparsable one is logged.
pub fn env_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok().filter(|v| !v.trim().is_empty())?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(name, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}

/// Comma-separated list from the environment. Blank items are dropped.
pub fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|raw| parse_list(&raw))
        .unwrap_or_default()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
pub struct CommonConfig {
    /// `RUST_LOG`-style filter. `LOG_LEVEL`, default `info`.
    pub log_level: String,
    /// TOML graph specification. `PROCESSING_GRAPH_SPECIFICATION`; the
    /// built-in graph is used when unset.
    pub graph_specification: Option<PathBuf>,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            graph_specification: None,
        }
    }
}

impl CommonConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: env_var("LOG_LEVEL").unwrap_or(defaults.log_level),
            graph_specification: env_var("PROCESSING_GRAPH_SPECIFICATION"),
        }
    }

    pub fn load_graph(&self) -> Result<ProcessingGraph, ConfigurationError> {
        match &self.graph_specification {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading processing graph specification");
                ProcessingGraph::from_specification(GraphSpecification::from_file(path)?)
            }
            None => ProcessingGraph::standard(),
        }
    }
}
