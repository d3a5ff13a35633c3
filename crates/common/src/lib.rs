// crates/common/src/lib.rs
//! Shared core of the dataset processing pipeline.
//!
//! Holds the processing graph, the job queue and the cache store. Both the
//! worker and the admin service depend on this crate; neither owns state the
//! other needs.

pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod job;
pub mod queue;
pub mod specification;
pub mod status;

pub use cache::{
    CacheEntry, CacheReport, CacheReportWithContent, CacheReportsPage, CacheStatus, CacheStore,
    UpsertOutcome,
};
pub use config::CommonConfig;
pub use error::{CacheError, ConfigurationError, QueueError, StepNotFound, StoreError};
pub use graph::{Granularity, ProcessingGraph, ProcessingStep};
pub use job::{JobId, JobInfo, JobKey, JobOutcome, JobParams, Priority};
pub use queue::{
    DuplicateJob, EnqueueOutcome, JobQueue, JobTypeFilter, JobsByState, QueueSnapshot, QueuedJob,
};
pub use specification::{GraphSpecification, StepSpecification};
pub use status::{dataset_status, DatasetStatus, StepStatus};
