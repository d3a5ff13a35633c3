// crates/admin/src/state.rs
//! Application state for the admin service.

use std::sync::Arc;
use std::time::Instant;

use datasets_pipeline_common::{CacheStore, JobQueue, ProcessingGraph};

use crate::config::AdminConfig;

/// Shared state of every admin handler. All views are read-only.
pub struct AppState {
    pub start_time: Instant,
    pub graph: Arc<ProcessingGraph>,
    pub queue: Arc<JobQueue>,
    pub cache: Arc<CacheStore>,
    pub config: AdminConfig,
}

impl AppState {
    pub fn new(
        graph: Arc<ProcessingGraph>,
        queue: Arc<JobQueue>,
        cache: Arc<CacheStore>,
        config: AdminConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            graph,
            queue,
            cache,
            config,
        })
    }

    /// Empty queue and cache over `graph`, default settings.
    pub fn in_memory(graph: Arc<ProcessingGraph>) -> Arc<Self> {
        let queue = Arc::new(JobQueue::new(Arc::clone(&graph)));
        Self::new(graph, queue, Arc::new(CacheStore::new()), AdminConfig::default())
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
