//! Bounded job queue and the dispatcher that drains it.

use super::executor::ConversionTask;
use crate::context::AppContext;
use crate::error::{EngineError, EngineResult};
use crate::state::Job;
use tokio::sync::mpsc;

/// A job waiting for a worker slot.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub job: Job,
    /// Times this job was pushed back because its source was still growing.
    pub requeues: u32,
}

impl QueueEntry {
    pub fn new(job: Job) -> Self {
        Self { job, requeues: 0 }
    }
}

/// Receiving end of the job queue, owned by the [`Dispatcher`].
pub type JobReceiver = mpsc::Receiver<QueueEntry>;

/// Sending end of the bounded FIFO job queue.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<QueueEntry>,
}

/// Create a queue holding at most `capacity` entries.
pub fn job_queue(capacity: usize) -> (JobQueue, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (JobQueue { tx }, rx)
}

impl JobQueue {
    /// Append an entry, waiting while the queue is full.
    pub async fn enqueue(&self, entry: QueueEntry) -> EngineResult<()> {
        self.tx
            .send(entry)
            .await
            .map_err(|_| EngineError::QueueClosed)
    }

    /// Entries currently waiting.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Turns queued jobs into conversion tasks.
pub struct Dispatcher {
    ctx: AppContext,
    rx: JobReceiver,
}

impl Dispatcher {
    pub fn new(ctx: AppContext, rx: JobReceiver) -> Self {
        Self { ctx, rx }
    }

    /// Receive until shutdown, spawning one task per job.
    ///
    /// Each task waits for a concurrency slot itself, so the dispatcher never
    /// blocks on a busy pool.
    pub async fn run(mut self) {
        tracing::info!(
            max_concurrent = self.ctx.config.conversion.max_concurrent,
            queue_size = self.ctx.queue.max_capacity(),
            "Dispatcher started"
        );

        loop {
            let entry = tokio::select! {
                entry = self.rx.recv() => entry,
                _ = self.ctx.shutdown.cancelled() => break,
            };

            let Some(entry) = entry else {
                break;
            };

            let id = entry.job.id;
            if self.ctx.skip.take(id) {
                tracing::debug!(job_id = %id, "Dropping skipped job");
                continue;
            }

            tracing::debug!(job_id = %id, requeues = entry.requeues, "Dispatching job");
            let task = ConversionTask::new(self.ctx.clone(), entry);
            self.ctx.tasks.spawn(task.run());
        }

        tracing::info!("Dispatcher stopped");
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
