//! Startup scan of the watched directory.
//!
//! Every recognized video already present becomes a job. Files whose output
//! already exists are recorded as Completed and never queued.

use crate::context::AppContext;
use crate::conversion::QueueEntry;
use crate::notifications::MessageType;
use crate::probe::probe_or_default;
use crate::state::{Insertion, Job};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, info};
use walkdir::WalkDir;
use watchforge_common::paths::converted_output_path;

/// Counts from one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub files_found: usize,
    pub queued: usize,
    pub already_converted: usize,
}

/// List recognized source files directly inside the watched directory.
pub fn list_sources(ctx: &AppContext) -> Result<Vec<PathBuf>> {
    let dir = &ctx.config.watch.dir;
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Failed to read watch directory: {:?}", dir))?;
        if entry.file_type().is_file() && ctx.config.watch.accepts(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Scan the watched directory once and enqueue what needs converting.
///
/// Waits while the queue is full, so the dispatcher must already be running
/// when the directory holds more files than the queue capacity.
pub async fn scan_directory(ctx: &AppContext) -> Result<ScanSummary> {
    let files = list_sources(ctx)?;
    let mut summary = ScanSummary {
        files_found: files.len(),
        ..Default::default()
    };

    info!(
        dir = %ctx.config.watch.dir.display(),
        files = files.len(),
        "Scanning watch directory"
    );

    for path in files {
        if ctx.shutdown.is_cancelled() {
            break;
        }

        if ctx.store.find_by_path(&path).is_some() {
            debug!(path = %path.display(), "Already tracked");
            continue;
        }

        let info = probe_or_default(ctx.prober.clone(), &path).await;
        let output = converted_output_path(&path, &ctx.config.output.dir);
        let converted = output.exists();
        let job = if converted {
            Job::already_converted(path, info.duration_secs)
        } else {
            Job::new(path, info.duration_secs)
        };

        // The watcher may have picked the file up while it was being probed.
        match ctx.store.insert_for_source(job.clone()) {
            Insertion::Duplicate(existing) => {
                debug!(job_id = %existing.id, "Tracked by the watcher during the scan");
                continue;
            }
            Insertion::Inserted { replaced } => {
                if let Some(old) = replaced {
                    ctx.hub.publish_job(MessageType::DeleteFile, true, &old);
                }
            }
        }
        ctx.hub.publish_job(MessageType::CreateFile, true, &job);

        if converted {
            debug!(job_id = %job.id, output = %output.display(), "Output already present");
            summary.already_converted += 1;
            continue;
        }

        debug!(job_id = %job.id, path = %job.file_path.display(), "Queueing scanned file");
        ctx.queue
            .enqueue(QueueEntry::new(job))
            .await
            .context("Job queue closed during scan")?;
        summary.queued += 1;
    }

    info!(
        queued = summary.queued,
        already_converted = summary.already_converted,
        "Scan complete"
    );
    Ok(summary)
}
