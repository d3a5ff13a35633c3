// crates/common/src/queue.rs
//! In-memory job queue with waiting/started bookkeeping.
//!
//! One lane per job type, each behind its own `RwLock`. The lane map is fixed
//! at construction from the processing graph, so no outer lock exists and
//! operations on different job types never contend. Every key-level operation
//! (enqueue, claim, complete, cancel, requeue) runs under the owning lane's
//! write lock, which is what keeps a `(job_type, dataset, config, split)` key
//! in at most one of Waiting/Started.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry as IdEntry;
use dashmap::DashMap;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use thiserror::Error;

use crate::error::{read_lock, write_lock, QueueError};
use crate::graph::{Granularity, ProcessingGraph, ProcessingStep};
use crate::job::{JobId, JobInfo, JobKey, JobOutcome, Priority};

/// The key was already waiting or started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Job {existing} is already queued for {key:?}")]
pub struct DuplicateJob {
    pub existing: JobId,
    pub key: JobKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new waiting entry was created.
    Enqueued(JobId),
    /// Forced request folded into the existing waiting entry; its priority
    /// was raised if the request was more urgent.
    Merged(JobId),
    Rejected(DuplicateJob),
}

/// Restricts which job types a worker may claim.
#[derive(Debug, Clone, Default)]
pub struct JobTypeFilter {
    only: Option<HashSet<String>>,
    blocked: HashSet<String>,
}

impl JobTypeFilter {
    /// Admit every job type.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(mut self, job_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(job_types.into_iter().map(Into::into).collect());
        self
    }

    pub fn blocked<I, S>(mut self, job_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked = job_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn admits(&self, job_type: &str) -> bool {
        let allowed = self.only.as_ref().map_or(true, |only| only.contains(job_type));
        allowed && !self.blocked.contains(job_type)
    }
}

/// A queue entry as shown to admin readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub job_type: String,
    pub dataset: String,
    pub config: Option<String>,
    pub split: Option<String>,
    pub priority: Priority,
    pub force: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobsByState {
    pub waiting: Vec<QueuedJob>,
    pub started: Vec<QueuedJob>,
}

/// Point-in-time view of the queue, one entry per declared job type in graph order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QueueSnapshot(pub IndexMap<String, JobsByState>);

impl QueueSnapshot {
    pub fn get(&self, job_type: &str) -> Option<&JobsByState> {
        self.0.get(job_type)
    }
}

#[derive(Debug, Clone)]
struct Started {
    at: DateTime<Utc>,
    worker: String,
}

#[derive(Debug, Clone)]
struct Entry {
    info: JobInfo,
    seq: u64,
    created_at: DateTime<Utc>,
    started: Option<Started>,
}

impl Entry {
    fn view(&self) -> QueuedJob {
        QueuedJob {
            job_id: self.info.job_id.clone(),
            job_type: self.info.job_type.clone(),
            dataset: self.info.dataset.clone(),
            config: self.info.config.clone(),
            split: self.info.split.clone(),
            priority: self.info.priority,
            force: self.info.force,
            created_at: self.created_at,
            started_at: self.started.as_ref().map(|s| s.at),
            worker: self.started.as_ref().map(|s| s.worker.clone()),
        }
    }
}

/// Waiting and started entries of one job type.
#[derive(Debug, Default)]
struct Lane {
    entries: HashMap<JobId, Entry>,
    keys: HashMap<JobKey, JobId>,
    /// Waiting entries ordered by (priority, insertion sequence).
    waiting: BTreeMap<(Priority, u64), JobId>,
    /// Started entries in start order.
    started: IndexSet<JobId>,
}

impl Lane {
    fn next_waiting(&self) -> Option<(Priority, u64)> {
        self.waiting.first_key_value().map(|(k, _)| *k)
    }

    fn start_next(&mut self, worker: &str, now: DateTime<Utc>) -> Option<JobInfo> {
        let (_, job_id) = self.waiting.pop_first()?;
        let entry = self.entries.get_mut(&job_id)?;
        entry.started = Some(Started {
            at: now,
            worker: worker.to_string(),
        });
        self.started.insert(job_id);
        Some(entry.info.clone())
    }

    fn remove(&mut self, job_id: &str) -> Option<Entry> {
        let entry = self.entries.remove(job_id)?;
        match entry.started {
            Some(_) => {
                self.started.shift_remove(job_id);
            }
            None => {
                self.waiting.remove(&(entry.info.priority, entry.seq));
            }
        }
        self.keys.remove(&entry.info.key());
        Some(entry)
    }

    fn views<'a>(&'a self, ids: impl Iterator<Item = &'a JobId>) -> Vec<QueuedJob> {
        ids.filter_map(|id| self.entries.get(id)).map(Entry::view).collect()
    }

    fn jobs_by_state(&self) -> JobsByState {
        JobsByState {
            waiting: self.views(self.waiting.values()),
            started: self.views(self.started.iter()),
        }
    }
}

pub struct JobQueue {
    graph: Arc<ProcessingGraph>,
    /// One lane per step, in graph order.
    lanes: Vec<RwLock<Lane>>,
    /// job id -> job type, so complete/cancel know which lane to lock.
    job_types: DashMap<JobId, String>,
    sequence: AtomicU64,
}

impl JobQueue {
    pub fn new(graph: Arc<ProcessingGraph>) -> Self {
        let lanes = graph.steps().iter().map(|_| RwLock::default()).collect();
        Self {
            graph,
            lanes,
            job_types: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn processing_graph(&self) -> &Arc<ProcessingGraph> {
        &self.graph
    }

    /// Admit a job as Waiting, unless its key is already waiting or started.
    ///
    /// Fails with [`QueueError::DuplicateJobId`] if another active job, of any
    /// type, already uses the same job id.
    pub fn enqueue(&self, job: JobInfo) -> Result<EnqueueOutcome, QueueError> {
        let step = self.graph.step_by_job_type(&job.job_type)?;
        check_scope(step, &job)?;
        let mut lane = write_lock(self.lane(&job.job_type)?)?;

        let key = job.key();
        if let Some(existing) = lane.keys.get(&key).cloned() {
            return Ok(merge_duplicate(&mut lane, existing, key, &job));
        }

        // job ids are unique across every lane, not just this one
        match self.job_types.entry(job.job_id.clone()) {
            IdEntry::Occupied(_) => {
                tracing::warn!(job_id = %job.job_id, job_type = %job.job_type, "Job id already queued");
                return Err(QueueError::DuplicateJobId(job.job_id));
            }
            IdEntry::Vacant(slot) => {
                slot.insert(job.job_type.clone());
            }
        }

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let job_id = job.job_id.clone();
        lane.waiting.insert((job.priority, seq), job_id.clone());
        lane.keys.insert(key, job_id.clone());
        tracing::debug!(job_id = %job_id, job_type = %job.job_type, dataset = %job.dataset, "Job enqueued");
        lane.entries.insert(
            job_id.clone(),
            Entry {
                info: job,
                seq,
                created_at: Utc::now(),
                started: None,
            },
        );
        Ok(EnqueueOutcome::Enqueued(job_id))
    }

    /// Move the most urgent waiting job admitted by `filter` to Started.
    ///
    /// Lower priority value wins; ties go to the earliest enqueued job. Returns
    /// `None` when nothing is waiting. Never blocks waiting for work.
    pub fn claim(&self, worker: &str, filter: &JobTypeFilter) -> Result<Option<JobInfo>, QueueError> {
        // locks are always taken in graph order
        let mut lanes = Vec::new();
        for (step, lane) in self.graph.steps().iter().zip(&self.lanes) {
            if filter.admits(&step.job_type) {
                lanes.push(write_lock(lane)?);
            }
        }

        let best = lanes
            .iter()
            .enumerate()
            .filter_map(|(i, lane)| lane.next_waiting().map(|order| (order, i)))
            .min();
        let Some((_, index)) = best else {
            return Ok(None);
        };

        let claimed = lanes[index].start_next(worker, Utc::now());
        if let Some(job) = &claimed {
            tracing::info!(job_id = %job.job_id, job_type = %job.job_type, dataset = %job.dataset, worker, "Job started");
        }
        Ok(claimed)
    }

    /// Remove a started job. Never requeues; that decision belongs to the caller.
    ///
    /// Returns `None` if the job is not currently started.
    pub fn complete(&self, job_id: &str, outcome: JobOutcome) -> Result<Option<JobInfo>, QueueError> {
        let Some(job_type) = self.job_type_of(job_id) else {
            tracing::warn!(job_id, "Completed job is not in the queue");
            return Ok(None);
        };
        let mut lane = write_lock(self.lane(&job_type)?)?;
        let is_started = lane
            .entries
            .get(job_id)
            .is_some_and(|entry| entry.started.is_some());
        if !is_started {
            tracing::warn!(job_id, job_type = %job_type, "Completed job is not started");
            return Ok(None);
        }
        let removed = lane.remove(job_id).map(|entry| entry.info);
        self.job_types.remove(job_id);
        tracing::info!(job_id, job_type = %job_type, outcome = outcome.as_str(), "Job finished");
        Ok(removed)
    }

    /// Drop a waiting or started job. A cancelled started job is not requeued.
    pub fn cancel(&self, job_id: &str) -> Result<Option<JobInfo>, QueueError> {
        let Some(job_type) = self.job_type_of(job_id) else {
            return Ok(None);
        };
        let mut lane = write_lock(self.lane(&job_type)?)?;
        let removed = lane.remove(job_id).map(|entry| entry.info);
        if removed.is_some() {
            self.job_types.remove(job_id);
            tracing::info!(job_id, job_type = %job_type, "Job cancelled");
        }
        Ok(removed)
    }

    /// Put a started job back in Waiting under a fresh job id, keeping its
    /// priority and queue position. Used by reclaimers after a worker crash.
    ///
    /// The old id is retired: a late `complete` or `cancel` from the worker
    /// that lost the job finds nothing and cannot free the key while another
    /// worker holds it.
    pub fn requeue(&self, job_id: &str) -> Result<Option<JobId>, QueueError> {
        let Some(job_type) = self.job_type_of(job_id) else {
            return Ok(None);
        };
        let mut lane = write_lock(self.lane(&job_type)?)?;
        let is_started = lane
            .entries
            .get(job_id)
            .is_some_and(|entry| entry.started.is_some());
        if !is_started {
            return Ok(None);
        }
        let Some(mut entry) = lane.entries.remove(job_id) else {
            return Ok(None);
        };
        let worker = entry.started.take().map(|s| s.worker).unwrap_or_default();
        lane.started.shift_remove(job_id);

        let new_id = uuid::Uuid::new_v4().to_string();
        entry.info.job_id = new_id.clone();
        lane.keys.insert(entry.info.key(), new_id.clone());
        lane.waiting.insert((entry.info.priority, entry.seq), new_id.clone());
        lane.entries.insert(new_id.clone(), entry);
        self.job_types.remove(job_id);
        self.job_types.insert(new_id.clone(), job_type.clone());
        tracing::warn!(job_id, new_job_id = %new_id, job_type = %job_type, worker = %worker, "Job requeued");
        Ok(Some(new_id))
    }

    /// Started jobs whose start time is older than `cutoff`.
    pub fn started_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<QueuedJob>, QueueError> {
        let mut stale = Vec::new();
        for lane in &self.lanes {
            let lane = read_lock(lane)?;
            stale.extend(
                lane.views(lane.started.iter())
                    .into_iter()
                    .filter(|job| job.started_at.is_some_and(|at| at < cutoff)),
            );
        }
        Ok(stale)
    }

    /// Consistent per-type view of every declared job type.
    ///
    /// Each lane is read under its own short read lock, so writers on other
    /// types are never held up for the whole scan.
    pub fn snapshot(&self) -> Result<QueueSnapshot, QueueError> {
        let mut snapshot = IndexMap::with_capacity(self.lanes.len());
        for (step, lane) in self.graph.steps().iter().zip(&self.lanes) {
            let jobs = read_lock(lane)?.jobs_by_state();
            snapshot.insert(step.job_type.clone(), jobs);
        }
        Ok(QueueSnapshot(snapshot))
    }

    /// Waiting and started jobs of one type for one dataset, waiting first.
    pub fn dataset_jobs(&self, job_type: &str, dataset: &str) -> Result<Vec<QueuedJob>, QueueError> {
        let lane = read_lock(self.lane(job_type)?)?;
        let JobsByState { waiting, started } = lane.jobs_by_state();
        Ok(waiting
            .into_iter()
            .chain(started)
            .filter(|job| job.dataset == dataset)
            .collect())
    }

    /// Number of active (waiting + started) jobs of one type.
    pub fn count(&self, job_type: &str) -> Result<usize, QueueError> {
        Ok(read_lock(self.lane(job_type)?)?.entries.len())
    }

    fn lane(&self, job_type: &str) -> Result<&RwLock<Lane>, QueueError> {
        Ok(&self.lanes[self.graph.index_of(job_type)?])
    }

    fn job_type_of(&self, job_id: &str) -> Option<String> {
        // clone out so the dashmap shard lock is released before taking a lane lock
        self.job_types.get(job_id).map(|entry| entry.value().clone())
    }
}

fn merge_duplicate(lane: &mut Lane, existing: JobId, key: JobKey, job: &JobInfo) -> EnqueueOutcome {
    let Some(entry) = lane.entries.get_mut(&existing) else {
        return EnqueueOutcome::Rejected(DuplicateJob { existing, key });
    };
    if !job.force || entry.started.is_some() {
        tracing::debug!(job_id = %existing, job_type = %job.job_type, "Duplicate job rejected");
        return EnqueueOutcome::Rejected(DuplicateJob { existing, key });
    }
    if job.priority < entry.info.priority {
        let old = (entry.info.priority, entry.seq);
        let new = (job.priority, entry.seq);
        entry.info.priority = job.priority;
        entry.info.force = true;
        lane.waiting.remove(&old);
        lane.waiting.insert(new, existing.clone());
        tracing::debug!(job_id = %existing, priority = ?job.priority, "Waiting job priority raised");
    }
    EnqueueOutcome::Merged(existing)
}

fn check_scope(step: &ProcessingStep, job: &JobInfo) -> Result<(), QueueError> {
    let reason = match (step.granularity, &job.config, &job.split) {
        (Granularity::Dataset, None, None)
        | (Granularity::Config, Some(_), None)
        | (Granularity::Split, Some(_), Some(_)) => return Ok(()),
        (Granularity::Dataset, _, _) => "config and split must be absent",
        (Granularity::Config, None, _) => "config is required",
        (Granularity::Config, Some(_), Some(_)) => "split must be absent",
        (Granularity::Split, _, _) => "config and split are required",
    };
    Err(QueueError::InvalidScope {
        job_type: step.job_type.clone(),
        granularity: step.granularity,
        reason,
    })
}
