// crates/common/src/graph.rs
//! The processing graph: the validated DAG of job types.
//!
//! Built once at startup from a [`GraphSpecification`] and shared read-only
//! behind an `Arc` by the queue, the dispatcher and the admin views.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, StepNotFound};
use crate::specification::{GraphSpecification, StepSpecification};

/// Scope an instance of a job type is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Dataset,
    Config,
    Split,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Dataset => write!(f, "dataset"),
            Granularity::Config => write!(f, "config"),
            Granularity::Split => write!(f, "split"),
        }
    }
}

/// Immutable descriptor of one job type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingStep {
    pub job_type: String,
    pub cache_kind: String,
    pub granularity: Granularity,
    /// Upstream job types, declaration order, no duplicates.
    pub triggered_by: Vec<String>,
    pub job_runner_version: u32,
}

pub struct ProcessingGraph {
    steps: Vec<ProcessingStep>,
    by_job_type: HashMap<String, usize>,
    by_cache_kind: HashMap<String, usize>,
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
}

impl fmt::Debug for ProcessingGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingGraph")
            .field("job_types", &self.job_types().collect::<Vec<_>>())
            .finish()
    }
}

impl ProcessingGraph {
    /// Validate the step specifications and build the graph.
    ///
    /// Rejects duplicate job types, duplicate cache kinds, dependencies on
    /// undeclared job types, and dependency cycles.
    pub fn new(
        specs: impl IntoIterator<Item = StepSpecification>,
    ) -> Result<Self, ConfigurationError> {
        let mut steps: Vec<ProcessingStep> = Vec::new();
        let mut by_job_type = HashMap::new();
        let mut by_cache_kind = HashMap::new();

        for spec in specs {
            let cache_kind = spec.cache_kind.unwrap_or_else(|| spec.job_type.clone());
            if by_job_type.contains_key(&spec.job_type) {
                return Err(ConfigurationError::DuplicateJobType(spec.job_type));
            }
            if by_cache_kind.contains_key(&cache_kind) {
                return Err(ConfigurationError::DuplicateCacheKind {
                    job_type: spec.job_type,
                    cache_kind,
                });
            }
            let mut seen = HashSet::new();
            let triggered_by = spec
                .triggered_by
                .into_iter()
                .filter(|parent| seen.insert(parent.clone()))
                .collect();

            by_job_type.insert(spec.job_type.clone(), steps.len());
            by_cache_kind.insert(cache_kind.clone(), steps.len());
            steps.push(ProcessingStep {
                job_type: spec.job_type,
                cache_kind,
                granularity: spec.input_type,
                triggered_by,
                job_runner_version: spec.job_runner_version,
            });
        }

        let mut parents = vec![Vec::new(); steps.len()];
        let mut children = vec![Vec::new(); steps.len()];
        for (index, step) in steps.iter().enumerate() {
            for parent in &step.triggered_by {
                let Some(&parent_index) = by_job_type.get(parent) else {
                    return Err(ConfigurationError::UnknownDependency {
                        job_type: step.job_type.clone(),
                        parent: parent.clone(),
                    });
                };
                parents[index].push(parent_index);
                children[parent_index].push(index);
            }
        }

        if let Some(cycle) = find_cycle(&parents) {
            return Err(ConfigurationError::Cycle(
                cycle.into_iter().map(|i| steps[i].job_type.clone()).collect(),
            ));
        }

        Ok(Self {
            steps,
            by_job_type,
            by_cache_kind,
            parents,
            children,
        })
    }

    pub fn from_specification(spec: GraphSpecification) -> Result<Self, ConfigurationError> {
        Self::new(spec.steps)
    }

    /// The built-in graph of the production job types.
    pub fn standard() -> Result<Self, ConfigurationError> {
        Self::from_specification(GraphSpecification::standard())
    }

    /// All steps in declaration order.
    pub fn steps(&self) -> &[ProcessingStep] {
        &self.steps
    }

    pub fn job_types(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.job_type.as_str())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_by_job_type(&self, job_type: &str) -> Result<&ProcessingStep, StepNotFound> {
        self.index_of(job_type).map(|i| &self.steps[i])
    }

    pub fn step_by_cache_kind(&self, cache_kind: &str) -> Result<&ProcessingStep, StepNotFound> {
        self.by_cache_kind
            .get(cache_kind)
            .map(|&i| &self.steps[i])
            .ok_or_else(|| StepNotFound {
                lookup: "cache kind",
                name: cache_kind.to_string(),
                valid: self.steps.iter().map(|s| s.cache_kind.clone()).collect(),
            })
    }

    /// Direct upstream steps.
    pub fn parents(&self, job_type: &str) -> Result<Vec<&ProcessingStep>, StepNotFound> {
        let index = self.index_of(job_type)?;
        Ok(self.parents[index].iter().map(|&i| &self.steps[i]).collect())
    }

    /// Direct downstream steps.
    pub fn children(&self, job_type: &str) -> Result<Vec<&ProcessingStep>, StepNotFound> {
        let index = self.index_of(job_type)?;
        Ok(self.children[index].iter().map(|&i| &self.steps[i]).collect())
    }

    /// Every step reachable by following `triggered_by` upward, in declaration order.
    pub fn ancestors(&self, job_type: &str) -> Result<Vec<&ProcessingStep>, StepNotFound> {
        let index = self.index_of(job_type)?;
        Ok(self.reachable(index, &self.parents))
    }

    /// Every step that (transitively) depends on `job_type`, in declaration order.
    pub fn descendants(&self, job_type: &str) -> Result<Vec<&ProcessingStep>, StepNotFound> {
        let index = self.index_of(job_type)?;
        Ok(self.reachable(index, &self.children))
    }

    /// Steps with no upstream dependency. These seed a dataset's processing.
    pub fn first_steps(&self) -> Vec<&ProcessingStep> {
        self.steps
            .iter()
            .zip(&self.parents)
            .filter(|(_, parents)| parents.is_empty())
            .map(|(step, _)| step)
            .collect()
    }

    /// Declaration position of a job type.
    pub(crate) fn index_of(&self, job_type: &str) -> Result<usize, StepNotFound> {
        self.by_job_type
            .get(job_type)
            .copied()
            .ok_or_else(|| StepNotFound {
                lookup: "job type",
                name: job_type.to_string(),
                valid: self.job_types().map(str::to_string).collect(),
            })
    }

    fn reachable(&self, start: usize, edges: &[Vec<usize>]) -> Vec<&ProcessingStep> {
        let mut visited = vec![false; self.steps.len()];
        let mut stack = edges[start].clone();
        while let Some(node) = stack.pop() {
            if !visited[node] {
                visited[node] = true;
                stack.extend(&edges[node]);
            }
        }
        // the graph is acyclic, so start is never reached from itself
        self.steps
            .iter()
            .zip(visited)
            .filter_map(|(step, hit)| hit.then_some(step))
            .collect()
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first search over `edges`; returns the first cycle found as a
/// closed path of node indices (first == last).
fn find_cycle(edges: &[Vec<usize>]) -> Option<Vec<usize>> {
    fn visit(
        node: usize,
        edges: &[Vec<usize>],
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[node] = Mark::InProgress;
        path.push(node);
        for &next in &edges[node] {
            match marks[next] {
                Mark::InProgress => {
                    let start = path.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = visit(next, edges, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }
        path.pop();
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unvisited; edges.len()];
    let mut path = Vec::new();
    for node in 0..edges.len() {
        if marks[node] == Mark::Unvisited {
            if let Some(cycle) = visit(node, edges, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}
