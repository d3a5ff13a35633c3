// crates/worker/src/lib.rs
//! Job execution side of the pipeline.
//!
//! - `DispatchTable` / `JobRunnerFactory`: job type -> runner, validated
//!   against the processing graph at startup
//! - `JobRunner`: runs one job and records its result in the cache
//! - `Worker`: polls the queue and drives runners

pub mod config;
pub mod dispatch;
pub mod error;
pub mod factory;
pub mod runner;
pub mod worker;

pub use config::WorkerConfig;
pub use dispatch::{DispatchEntry, DispatchTable, Resource, RunnerBuilder, RunnerParts};
pub use error::{DispatchError, JobRunnerError, WorkerError};
pub use factory::{JobRunnerDispatcher, JobRunnerFactory};
pub use runner::{Compute, InjectedResources, JobOutput, JobRunner, RunContext, StepJobRunner};
pub use worker::{describe_metrics, Worker};
