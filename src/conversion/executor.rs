//! Per-job conversion task.
//!
//! A task owns one queued job from slot acquisition to finalization:
//! readiness check, output collision check, probe, encoder launch with a
//! progress monitor, and the single terminal write to the store.

use super::dispatcher::QueueEntry;
use super::encoder::{EncodeRequest, EncoderExit};
use super::progress::{ProgressEndpoint, ProgressMonitor, ProgressReport};
use super::registry::remove_partial_output;
use crate::context::AppContext;
use crate::notifications::MessageType;
use crate::probe::probe_or_default;
use crate::state::{Job, JobStatus, Outcome};
use std::path::Path;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;
use watchforge_av::scale_filter;
use watchforge_common::paths::converted_output_path;
use watchforge_common::JobId;

/// Sample a file's size until two consecutive samples match.
///
/// Takes at most `checks` samples `interval` apart. A file that cannot be
/// stat'ed is not ready.
pub async fn wait_until_stable(
    path: &Path,
    interval: Duration,
    checks: u32,
    cancel: &CancellationToken,
) -> bool {
    let mut last_size: Option<u64> = None;

    for attempt in 0..checks {
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::debug!(path = %path.display(), "Readiness stat failed: {}", e);
                return false;
            }
        };

        if last_size == Some(size) {
            return true;
        }
        last_size = Some(size);

        if attempt + 1 < checks {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => return false,
            }
        }
    }

    false
}

/// How the encoder run ended, before it is mapped to an [`Outcome`].
enum RunEnd {
    Exited(std::io::Result<EncoderExit>),
    Interrupted,
}

pub struct ConversionTask {
    ctx: AppContext,
    entry: QueueEntry,
}

impl ConversionTask {
    pub fn new(ctx: AppContext, entry: QueueEntry) -> Self {
        Self { ctx, entry }
    }

    pub async fn run(self) {
        let id = self.entry.job.id;
        let skip = self.ctx.skip.clone();
        self.process().await;
        // Nothing is left to skip once this task is done with the ID. A
        // requeued entry finds the job gone from the store on its own.
        skip.take(id);
    }

    async fn process(self) {
        let id = self.entry.job.id;

        if !self.wait_for_auto_convert().await {
            return;
        }

        let permit = tokio::select! {
            permit = self.ctx.slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = self.ctx.shutdown.cancelled() => return,
        };

        if self.ctx.skip.take(id) {
            tracing::debug!(job_id = %id, "Job skipped while waiting for a slot");
            return;
        }

        let job = match self.ctx.store.get(id) {
            Some(job) if job.status == JobStatus::Queued => job,
            Some(job) => {
                tracing::debug!(job_id = %id, status = %job.status, "Job no longer queued");
                return;
            }
            None => {
                tracing::debug!(job_id = %id, "Job removed before conversion");
                return;
            }
        };

        let conversion = &self.ctx.config.conversion;
        let ready = wait_until_stable(
            &job.file_path,
            conversion.readiness_interval(),
            conversion.readiness_checks,
            &self.ctx.shutdown,
        )
        .await;

        if !ready {
            drop(permit);
            self.requeue(job).await;
            return;
        }

        self.convert(job, permit).await;
    }

    /// Block while auto-convert is off. Returns `false` on shutdown.
    async fn wait_for_auto_convert(&self) -> bool {
        let poll = self.ctx.config.conversion.auto_convert_poll();
        while !self.ctx.flags.auto_convert() {
            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = self.ctx.shutdown.cancelled() => return false,
            }
        }
        true
    }

    async fn requeue(self, job: Job) {
        let id = job.id;
        let max = self.ctx.config.conversion.max_requeues;

        if self.ctx.shutdown.is_cancelled() {
            return;
        }

        if max != 0 && self.entry.requeues >= max {
            tracing::warn!(
                job_id = %id,
                path = %job.file_path.display(),
                requeues = self.entry.requeues,
                "Source never settled, giving up"
            );
            match self.ctx.store.transition(id, JobStatus::Failed) {
                Ok(job) => {
                    self.ctx.hub.publish_job(MessageType::UpdateFile, true, &job);
                }
                Err(e) => tracing::debug!(job_id = %id, "Could not fail unsettled job: {}", e),
            }
            return;
        }

        tracing::info!(
            job_id = %id,
            path = %job.file_path.display(),
            "Source not ready, requeueing"
        );
        let entry = QueueEntry {
            job,
            requeues: self.entry.requeues + 1,
        };
        if let Err(e) = self.ctx.queue.enqueue(entry).await {
            tracing::warn!(job_id = %id, "Failed to requeue job: {}", e);
        }
    }

    async fn convert(self, job: Job, permit: OwnedSemaphorePermit) {
        let ctx = &self.ctx;
        let id = job.id;
        let output = converted_output_path(&job.file_path, &ctx.config.output.dir);

        if output.exists() && !ctx.flags.overwrite_existing() {
            tracing::info!(
                job_id = %id,
                output = %output.display(),
                "Output already exists, rejecting"
            );
            if let Ok(job) = ctx.store.transition(id, JobStatus::Rejected) {
                ctx.hub.publish_job(MessageType::UpdateFile, true, &job);
            }
            return;
        }

        // Probe results live only as long as this task.
        let info = probe_or_default(ctx.prober.clone(), &job.file_path).await;
        let duration = if info.duration_secs > 0.0 {
            if info.duration_secs != job.duration {
                ctx.store.set_duration(id, info.duration_secs);
            }
            info.duration_secs
        } else {
            job.duration
        };
        let filter = scale_filter(info.width, info.height).map(str::to_string);

        let endpoint = match ProgressEndpoint::bind(id).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::error!(job_id = %id, "{}", e);
                if let Ok(job) = ctx.store.transition(id, JobStatus::Failed) {
                    ctx.hub.publish_job(MessageType::UpdateFile, true, &job);
                }
                return;
            }
        };

        let token = ctx.shutdown.child_token();
        ctx.registry.register(id, token.clone(), output.clone());

        let job = match ctx.store.transition(id, JobStatus::Processing) {
            Ok(job) => job,
            Err(e) => {
                tracing::debug!(job_id = %id, "Not starting conversion: {}", e);
                ctx.registry.unregister(id);
                return;
            }
        };
        ctx.hub.publish_job(MessageType::UpdateFile, false, &job);

        let request = EncodeRequest {
            job_id: id,
            input: job.file_path.clone(),
            output: output.clone(),
            progress_url: endpoint.url(),
            filter,
        };

        tracing::info!(
            job_id = %id,
            input = %job.file_path.display(),
            output = %output.display(),
            "Starting conversion"
        );

        let mut process = match ctx.encoder.spawn(request) {
            Ok(process) => process,
            Err(e) => {
                tracing::error!(job_id = %id, "{}", e);
                self.finish(id, &output, Outcome::failed(e.to_string()));
                drop(permit);
                return;
            }
        };

        let monitor_token = token.child_token();
        let monitor = ProgressMonitor::new(id, duration, ctx.store.clone(), ctx.hub.clone())
            .spawn(endpoint, monitor_token.clone());

        let end = tokio::select! {
            exit = process.wait() => RunEnd::Exited(exit),
            _ = token.cancelled() => {
                tracing::info!(job_id = %id, pid = ?process.id(), "Interrupting encoder");
                if let Err(e) = process.interrupt(ctx.config.conversion.interrupt_grace()).await {
                    tracing::warn!(job_id = %id, "Failed to stop encoder: {}", e);
                }
                RunEnd::Interrupted
            }
        };

        let report =
            collect_report(monitor, monitor_token, ctx.config.conversion.progress_wait()).await;

        let outcome = match end {
            RunEnd::Interrupted => Outcome::Cancelled,
            RunEnd::Exited(Err(e)) => Outcome::failed(format!("waiting for encoder: {}", e)),
            RunEnd::Exited(Ok(exit)) if !exit.success() => {
                Outcome::failed(format!("encoder failed with {}", exit))
            }
            RunEnd::Exited(Ok(_)) if !report.saw_end => Outcome::failed("no completion marker"),
            RunEnd::Exited(Ok(_)) => Outcome::Completed {
                source_deleted: false,
            },
        };

        self.finish(id, &output, outcome);
        drop(permit);
    }

    /// Write the terminal state once, clean up and notify.
    fn finish(&self, id: JobId, output: &Path, outcome: Outcome) {
        let ctx = &self.ctx;
        let source = self.entry.job.file_path.clone();
        let delete_after = ctx.flags.delete_after();

        let finalized = ctx.store.finalize_with(id, || match outcome {
            Outcome::Completed { .. } if delete_after => Outcome::Completed {
                source_deleted: delete_source(&source),
            },
            other => other,
        });

        ctx.registry.unregister(id);

        match finalized {
            Some(job) => {
                match job.status {
                    JobStatus::Completed | JobStatus::CompleteDeleted => {
                        tracing::info!(job_id = %id, status = %job.status, "Conversion completed");
                    }
                    _ => {
                        tracing::warn!(job_id = %id, status = %job.status, "Conversion did not complete");
                        remove_partial_output(output);
                    }
                }
                ctx.hub.publish_job(MessageType::UpdateFile, true, &job);
            }
            None => {
                // Lost the race to source removal.
                tracing::debug!(job_id = %id, "Job already finalized elsewhere");
                remove_partial_output(output);
            }
        }
    }
}

/// Give the monitor a bounded time to drain, then stop it.
async fn collect_report(
    mut monitor: tokio::task::JoinHandle<ProgressReport>,
    monitor_token: CancellationToken,
    wait: Duration,
) -> ProgressReport {
    match tokio::time::timeout(wait, &mut monitor).await {
        Ok(report) => report.unwrap_or_default(),
        Err(_) => {
            monitor_token.cancel();
            monitor.await.unwrap_or_default()
        }
    }
}

fn delete_source(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "Deleted source after conversion");
            true
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to delete source: {}", e);
            false
        }
    }
}
