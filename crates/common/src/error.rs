// crates/common/src/error.rs
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::graph::Granularity;

/// Structural errors in the processing graph or the dispatch table.
///
/// Raised once at startup. A process that hits one of these must not serve
/// traffic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Duplicate job type in processing graph: {0}")]
    DuplicateJobType(String),

    #[error("Duplicate cache kind '{cache_kind}' (declared again by job type '{job_type}')")]
    DuplicateCacheKind { job_type: String, cache_kind: String },

    #[error("Job type '{job_type}' is triggered by undeclared job type '{parent}'")]
    UnknownDependency { job_type: String, parent: String },

    #[error("Processing graph contains a dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Invalid processing graph specification: {0}")]
    Specification(String),

    #[error("Job type '{0}' is registered twice in the dispatch table")]
    DuplicateDispatchEntry(String),

    #[error("Job type '{0}' has no dispatch table entry")]
    MissingDispatchEntry(String),

    #[error("Dispatch table entry '{0}' is not declared in the processing graph")]
    UnknownDispatchEntry(String),
}

/// A lookup in the processing graph matched no step.
///
/// Carries every valid name so boundary callers can report them to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {lookup} '{name}'. The {lookup}s declared in the processing graph are: {}", .valid.join(", "))]
pub struct StepNotFound {
    pub lookup: &'static str,
    pub name: String,
    pub valid: Vec<String>,
}

/// Failure of the backing store itself. Transient from the caller's view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(e: PoisonError<T>) -> Self {
        tracing::error!("RwLock poisoned: {e}");
        StoreError::Unavailable(e.to_string())
    }
}

/// Errors returned by the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error(transparent)]
    UnknownJobType(#[from] StepNotFound),

    #[error("Job type '{job_type}' is {granularity}-scoped: {reason}")]
    InvalidScope {
        job_type: String,
        granularity: Granularity,
        reason: &'static str,
    },

    #[error("Job id '{0}' is already in use by another queued job")]
    DuplicateJobId(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors returned by the cache store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Invalid cursor: '{0}'")]
    InvalidCursor(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read().map_err(StoreError::from)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write().map_err(StoreError::from)
}
