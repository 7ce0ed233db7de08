//! Shared application context.
//!
//! [`AppContext`] bundles every shared component of the pipeline. It is cheap
//! to clone and is handed to the dispatcher, the watcher and the HTTP routes.

use crate::config::{Config, RuntimeFlags};
use crate::conversion::{
    job_queue, CancellationRegistry, Encoder, FfmpegEncoder, JobQueue, JobReceiver,
};
use crate::notifications::Hub;
use crate::probe::{resolve_tool, FfprobeProber, Prober};
use crate::state::JobStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use watchforge_common::JobId;

/// Job IDs the dispatcher must drop instead of converting.
#[derive(Debug, Default)]
pub struct SkipSet {
    ids: Mutex<HashSet<JobId>>,
}

impl SkipSet {
    pub fn insert(&self, id: JobId) {
        self.ids.lock().insert(id);
    }

    /// Remove `id`, returning whether it was present.
    pub fn take(&self, id: JobId) -> bool {
        self.ids.lock().remove(&id)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.ids.lock().contains(&id)
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub flags: Arc<RuntimeFlags>,
    pub store: Arc<JobStore>,
    pub hub: Arc<Hub>,
    pub registry: Arc<CancellationRegistry>,
    pub skip: Arc<SkipSet>,
    pub queue: JobQueue,
    /// Concurrency slots, one per simultaneous conversion.
    pub slots: Arc<Semaphore>,
    pub encoder: Arc<dyn Encoder>,
    pub prober: Arc<dyn Prober>,
    /// Root token; cancelling it stops every background task.
    pub shutdown: CancellationToken,
    /// Tracks conversion tasks so shutdown can wait for them.
    pub tasks: TaskTracker,
    pub started_at: DateTime<Utc>,
}

impl AppContext {
    /// Build a context around the given encoder and prober.
    ///
    /// Returns the receiving end of the job queue, which belongs to the
    /// dispatcher.
    pub fn new(
        config: Config,
        encoder: Arc<dyn Encoder>,
        prober: Arc<dyn Prober>,
        shutdown: CancellationToken,
    ) -> (Self, JobReceiver) {
        let (queue, rx) = job_queue(config.conversion.max_queue_size);
        let store = Arc::new(JobStore::new());

        let ctx = Self {
            flags: Arc::new(RuntimeFlags::new(&config.conversion)),
            hub: Arc::new(Hub::new(store.clone())),
            store,
            registry: Arc::new(CancellationRegistry::new()),
            skip: Arc::new(SkipSet::default()),
            queue,
            slots: Arc::new(Semaphore::new(config.conversion.max_concurrent)),
            encoder,
            prober,
            shutdown,
            tasks: TaskTracker::new(),
            started_at: Utc::now(),
            config: Arc::new(config),
        };
        (ctx, rx)
    }

    /// Build a context that runs the configured ffmpeg and ffprobe binaries.
    pub fn with_ffmpeg(config: Config, shutdown: CancellationToken) -> (Self, JobReceiver) {
        let encoder = Arc::new(FfmpegEncoder::new(resolve_tool(&config.tools.ffmpeg)));
        let prober = Arc::new(FfprobeProber::new(resolve_tool(&config.tools.ffprobe)));
        Self::new(config, encoder, prober, shutdown)
    }
}
