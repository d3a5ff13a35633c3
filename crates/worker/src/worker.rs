// crates/worker/src/worker.rs
//! The claim -> build -> process -> complete loop.

use std::sync::Arc;

use chrono::Utc;
use datasets_pipeline_common::{CacheStore, JobOutcome, JobQueue, JobTypeFilter};
use metrics::{counter, describe_counter};
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::factory::JobRunnerDispatcher;

/// Describe the counters a worker emits. Safe to call more than once.
pub fn describe_metrics() {
    describe_counter!("worker_jobs_total", "Jobs finished by job type and outcome");
    describe_counter!(
        "worker_jobs_reclaimed_total",
        "Started jobs put back in Waiting after exceeding the maximum job duration"
    );
}

pub struct Worker {
    queue: Arc<JobQueue>,
    cache: Arc<CacheStore>,
    dispatcher: Arc<dyn JobRunnerDispatcher>,
    config: Arc<WorkerConfig>,
    filter: JobTypeFilter,
}

impl Worker {
    pub fn new(
        queue: Arc<JobQueue>,
        cache: Arc<CacheStore>,
        dispatcher: Arc<dyn JobRunnerDispatcher>,
        config: Arc<WorkerConfig>,
    ) -> Self {
        let filter = config.job_type_filter();
        Self {
            queue,
            cache,
            dispatcher,
            config,
            filter,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Claim and process one job. Returns `None` when nothing was waiting.
    ///
    /// A claimed job is always completed, whatever happens to its runner, so
    /// it never lingers in Started.
    pub fn process_next(&self) -> Result<Option<JobOutcome>, WorkerError> {
        let Some(job) = self.queue.claim(self.worker_id(), &self.filter)? else {
            return Ok(None);
        };
        let job_id = job.job_id.clone();
        let job_type = job.job_type.clone();

        let outcome = match self.dispatcher.create(job) {
            Ok(runner) => match runner.process(&self.cache) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(job_id = %job_id, job_type = %job_type, "Failed to record job result: {e}");
                    JobOutcome::Error
                }
            },
            Err(e) => {
                tracing::error!(job_id = %job_id, job_type = %job_type, "{e}");
                JobOutcome::Error
            }
        };

        self.queue.complete(&job_id, outcome)?;
        counter!("worker_jobs_total", "job_type" => job_type, "outcome" => outcome.as_str())
            .increment(1);
        Ok(Some(outcome))
    }

    /// Put back in Waiting every started job older than the maximum job duration.
    pub fn reclaim_zombies(&self) -> Result<usize, WorkerError> {
        let Ok(max) = chrono::Duration::from_std(self.config.max_job_duration) else {
            return Ok(0);
        };
        let mut reclaimed = 0;
        for job in self.queue.started_before(Utc::now() - max)? {
            if let Some(new_job_id) = self.queue.requeue(&job.job_id)? {
                tracing::warn!(
                    job_id = %job.job_id,
                    new_job_id = %new_job_id,
                    job_type = %job.job_type,
                    worker = ?job.worker,
                    "Reclaimed job from unresponsive worker"
                );
                counter!("worker_jobs_reclaimed_total", "job_type" => job.job_type).increment(1);
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    /// Poll the queue until `cancel` fires.
    ///
    /// Jobs run on the blocking pool. When the queue is empty the worker
    /// reclaims abandoned jobs, then sleeps for the configured interval.
    pub async fn run_until_cancelled(self: Arc<Self>, cancel: CancellationToken) {
        describe_metrics();
        tracing::info!(worker_id = %self.worker_id(), "Worker started");
        while !cancel.is_cancelled() {
            let worker = Arc::clone(&self);
            let idle = match tokio::task::spawn_blocking(move || worker.process_next()).await {
                Ok(Ok(Some(_))) => false,
                Ok(Ok(None)) => true,
                Ok(Err(e)) => {
                    tracing::error!(worker_id = %self.worker_id(), "Worker iteration failed: {e}");
                    true
                }
                Err(e) => {
                    tracing::error!(worker_id = %self.worker_id(), "Job task panicked: {e}");
                    true
                }
            };
            if !idle {
                continue;
            }

            if let Err(e) = self.reclaim_zombies() {
                tracing::warn!(worker_id = %self.worker_id(), "Reclaim failed: {e}");
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.sleep_interval) => {}
            }
        }
        tracing::info!(worker_id = %self.worker_id(), "Worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchTable;
    use crate::error::{DispatchError, JobRunnerError};
    use crate::factory::JobRunnerFactory;
    use crate::runner::{Compute, JobOutput, JobRunner, RunContext};
    use datasets_pipeline_common::{CacheStatus, Granularity, JobInfo, ProcessingGraph, StepSpecification};
    use serde_json::json;
    use std::time::Duration;

    struct Answer;

    impl Compute for Answer {
        fn compute(&self, ctx: &RunContext<'_>) -> Result<JobOutput, JobRunnerError> {
            match ctx.job.dataset.as_str() {
                "broken" => Err(JobRunnerError::failed("DatasetNotFoundError", "missing", 404)),
                _ => Ok(JobOutput::new(json!({ "answer": 42 }))),
            }
        }
    }

    /// Always fails: the job type is treated as unknown.
    struct RejectAll;

    impl JobRunnerDispatcher for RejectAll {
        fn create(&self, job: JobInfo) -> Result<Box<dyn JobRunner>, DispatchError> {
            Err(DispatchError::UnsupportedJobType {
                job_type: job.job_type,
                supported: vec![],
            })
        }
    }

    struct Fixture {
        queue: Arc<JobQueue>,
        cache: Arc<CacheStore>,
        graph: Arc<ProcessingGraph>,
    }

    fn fixture() -> Fixture {
        let graph = Arc::new(
            ProcessingGraph::new([StepSpecification::new("dataset-config-names", Granularity::Dataset)])
                .unwrap(),
        );
        Fixture {
            queue: Arc::new(JobQueue::new(Arc::clone(&graph))),
            cache: Arc::new(CacheStore::new()),
            graph,
        }
    }

    fn config() -> Arc<WorkerConfig> {
        Arc::new(WorkerConfig {
            sleep_interval: Duration::from_millis(10),
            ..WorkerConfig::default()
        })
    }

    fn worker(f: &Fixture, config: Arc<WorkerConfig>) -> Worker {
        let factory = JobRunnerFactory::new(
            Arc::clone(&f.graph),
            DispatchTable::new().register("dataset-config-names", &[]),
            Arc::clone(&config),
            Arc::new(Answer),
        )
        .unwrap();
        Worker::new(Arc::clone(&f.queue), Arc::clone(&f.cache), Arc::new(factory), config)
    }

    #[test]
    fn test_process_next_on_empty_queue() {
        let f = fixture();
        assert_eq!(worker(&f, config()).process_next().unwrap(), None);
    }

    #[test]
    fn test_process_next_success_then_skip() {
        let f = fixture();
        let w = worker(&f, config());
        f.queue.enqueue(JobInfo::new("dataset-config-names", "ds")).unwrap();
        assert_eq!(w.process_next().unwrap(), Some(JobOutcome::Success));
        assert_eq!(f.queue.count("dataset-config-names").unwrap(), 0);

        let entry = f.cache.get("dataset-config-names", "ds", None, None).unwrap().unwrap();
        assert_eq!(entry.content, json!({ "answer": 42 }));

        f.queue.enqueue(JobInfo::new("dataset-config-names", "ds")).unwrap();
        assert_eq!(w.process_next().unwrap(), Some(JobOutcome::Skipped));
    }

    #[test]
    fn test_runner_failure_writes_error_entry_and_completes() {
        let f = fixture();
        let w = worker(&f, config());
        f.queue.enqueue(JobInfo::new("dataset-config-names", "broken")).unwrap();
        assert_eq!(w.process_next().unwrap(), Some(JobOutcome::Error));
        assert_eq!(f.queue.count("dataset-config-names").unwrap(), 0);

        let entry = f.cache.get("dataset-config-names", "broken", None, None).unwrap().unwrap();
        assert_eq!(entry.status, CacheStatus::Error);
        assert_eq!(entry.http_status, 404);
        assert_eq!(entry.error_code.as_deref(), Some("DatasetNotFoundError"));
    }

    #[test]
    fn test_dispatch_failure_still_completes_job() {
        let f = fixture();
        let w = Worker::new(Arc::clone(&f.queue), Arc::clone(&f.cache), Arc::new(RejectAll), config());
        f.queue.enqueue(JobInfo::new("dataset-config-names", "ds")).unwrap();
        assert_eq!(w.process_next().unwrap(), Some(JobOutcome::Error));
        assert_eq!(f.queue.count("dataset-config-names").unwrap(), 0);
        assert!(f.cache.get("dataset-config-names", "ds", None, None).unwrap().is_none());
    }

    #[test]
    fn test_blocked_job_types_are_not_claimed() {
        let f = fixture();
        let config = Arc::new(WorkerConfig {
            job_types_blocked: vec!["dataset-config-names".into()],
            ..WorkerConfig::default()
        });
        let w = worker(&f, config);
        f.queue.enqueue(JobInfo::new("dataset-config-names", "ds")).unwrap();
        assert_eq!(w.process_next().unwrap(), None);
        assert_eq!(f.queue.count("dataset-config-names").unwrap(), 1);
    }

    #[test]
    fn test_reclaim_zombies() {
        let f = fixture();
        f.queue.enqueue(JobInfo::new("dataset-config-names", "ds")).unwrap();
        let lost = f.queue.claim("crashed-worker", &JobTypeFilter::all()).unwrap().unwrap();

        let patient = worker(&f, config());
        assert_eq!(patient.reclaim_zombies().unwrap(), 0);

        let impatient = worker(
            &f,
            Arc::new(WorkerConfig {
                max_job_duration: Duration::ZERO,
                ..WorkerConfig::default()
            }),
        );
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(impatient.reclaim_zombies().unwrap(), 1);
        let snapshot = f.queue.snapshot().unwrap();
        assert_eq!(snapshot.get("dataset-config-names").unwrap().waiting.len(), 1);

        // the crashed worker coming back late cannot finish the reclaimed job
        assert!(f.queue.complete(&lost.job_id, JobOutcome::Success).unwrap().is_none());
        assert_eq!(impatient.process_next().unwrap(), Some(JobOutcome::Success));
        assert_eq!(f.queue.count("dataset-config-names").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_until_cancelled_drains_queue() {
        let f = fixture();
        for i in 0..5 {
            f.queue
                .enqueue(JobInfo::new("dataset-config-names", format!("ds-{i}")))
                .unwrap();
        }
        let w = Arc::new(worker(&f, config()));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&w).run_until_cancelled(cancel.clone()));

        for _ in 0..200 {
            if f.queue.count("dataset-config-names").unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(f.queue.count("dataset-config-names").unwrap(), 0);
        assert_eq!(
            f.cache
                .list_reports("dataset-config-names", None, 100)
                .unwrap()
                .reports
                .len(),
            5
        );
    }
}
