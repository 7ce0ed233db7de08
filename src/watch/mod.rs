//! Continuous watching of the input directory.
//!
//! Creation (or rename into the directory) of a recognized file creates and
//! queues a job; removal (or rename away) cancels and forgets it.

use crate::context::AppContext;
use crate::conversion::QueueEntry;
use crate::notifications::MessageType;
use crate::probe::probe_or_default;
use crate::state::{Insertion, Job, JobStatus, Removal};
use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// A filesystem change the pipeline reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Created(PathBuf),
    Removed(PathBuf),
}

/// Translate a notify event into pipeline changes.
pub fn classify_event(event: &Event) -> Vec<FileChange> {
    match &event.kind {
        EventKind::Create(_) => event.paths.iter().cloned().map(FileChange::Created).collect(),
        EventKind::Remove(_) => event.paths.iter().cloned().map(FileChange::Removed).collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::To => event.paths.iter().cloned().map(FileChange::Created).collect(),
            RenameMode::From => event.paths.iter().cloned().map(FileChange::Removed).collect(),
            RenameMode::Both => {
                let mut changes = Vec::new();
                if let Some(from) = event.paths.first() {
                    changes.push(FileChange::Removed(from.clone()));
                }
                if let Some(to) = event.paths.get(1) {
                    changes.push(FileChange::Created(to.clone()));
                }
                changes
            }
            // Backends that cannot tell the direction: decide by existence.
            _ => event
                .paths
                .iter()
                .map(|p| {
                    if p.exists() {
                        FileChange::Created(p.clone())
                    } else {
                        FileChange::Removed(p.clone())
                    }
                })
                .collect(),
        },
        _ => Vec::new(),
    }
}

/// React to a new file in the watched directory.
pub async fn handle_created(ctx: &AppContext, path: &Path) -> Result<()> {
    if !path.is_file() || !ctx.config.watch.accepts(path) {
        return Ok(());
    }

    if let Some(existing) = ctx.store.find_by_path(path) {
        if existing.is_active() {
            tracing::debug!(job_id = %existing.id, path = %path.display(), "Already queued");
            return Ok(());
        }
    }

    let info = probe_or_default(ctx.prober.clone(), path).await;
    let job = Job::new(path.to_path_buf(), info.duration_secs);

    // A finished job for the same name is replaced by the new arrival.
    match ctx.store.insert_for_source(job.clone()) {
        Insertion::Duplicate(existing) => {
            tracing::debug!(job_id = %existing.id, path = %path.display(), "Already queued");
            return Ok(());
        }
        Insertion::Inserted { replaced } => {
            if let Some(old) = replaced {
                ctx.hub.publish_job(MessageType::DeleteFile, true, &old);
            }
        }
    }
    ctx.hub.publish_job(MessageType::CreateFile, true, &job);

    tracing::info!(job_id = %job.id, path = %path.display(), "New file queued");
    ctx.queue
        .enqueue(QueueEntry::new(job))
        .await
        .context("Job queue closed")?;
    Ok(())
}

/// React to a file leaving the watched directory.
///
/// Returns `true` if a job was dropped. Calling it again for the same path
/// is a no-op.
pub fn handle_removed(ctx: &AppContext, path: &Path) -> bool {
    let Some(removal) = ctx.store.remove_for_source(path) else {
        return false;
    };

    match removal {
        Removal::Ignored(job) => {
            tracing::debug!(job_id = %job.id, "Source consumed by conversion, ignoring removal");
            false
        }
        Removal::Removed {
            job,
            was_processing,
        } => {
            // A running conversion is stopped through its token; only a
            // queued entry still has to be dropped on dequeue.
            if was_processing {
                ctx.registry.cancel(job.id);
            } else if job.status == JobStatus::Queued {
                ctx.skip.insert(job.id);
            }
            tracing::info!(
                job_id = %job.id,
                path = %path.display(),
                was_processing,
                "Source removed, dropping job"
            );
            ctx.hub.publish_job(MessageType::DeleteFile, true, &job);
            true
        }
    }
}

/// File watcher that monitors the input directory.
pub struct FileWatcher {
    ctx: AppContext,
    watcher: Option<RecommendedWatcher>,
}

impl FileWatcher {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx, watcher: None }
    }

    /// Start watching; events are handled on a spawned task until shutdown.
    pub fn start(&mut self) -> Result<()> {
        let (event_tx, mut event_rx) = mpsc::channel::<FileChange>(256);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for change in classify_event(&event) {
                        let _ = event_tx.blocking_send(change);
                    }
                }
                Err(e) => tracing::warn!("Watch error: {}", e),
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;

        let dir = &self.ctx.config.watch.dir;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch path: {:?}", dir))?;
        tracing::info!("Watching directory: {:?}", dir);

        self.watcher = Some(watcher);

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    change = event_rx.recv() => change,
                    _ = ctx.shutdown.cancelled() => break,
                };
                let Some(change) = change else {
                    break;
                };

                tracing::debug!("File event: {:?}", change);
                match change {
                    FileChange::Created(path) => {
                        if let Err(e) = handle_created(&ctx, &path).await {
                            tracing::warn!(path = %path.display(), "Failed to queue file: {:#}", e);
                        }
                    }
                    FileChange::Removed(path) => {
                        handle_removed(&ctx, &path);
                    }
                }
            }
            tracing::debug!("Watch event loop stopped");
        });

        Ok(())
    }

    /// Stop watching
    pub fn stop(&mut self) {
        self.watcher = None;
        tracing::info!("File watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn test_create_and_remove() {
        let created = classify_event(&event(EventKind::Create(CreateKind::File), &["/w/a.mp4"]));
        assert_eq!(created, [FileChange::Created(PathBuf::from("/w/a.mp4"))]);

        let removed = classify_event(&event(EventKind::Remove(RemoveKind::File), &["/w/a.mp4"]));
        assert_eq!(removed, [FileChange::Removed(PathBuf::from("/w/a.mp4"))]);
    }

    #[test]
    fn test_rename_both_is_remove_then_create() {
        let changes = classify_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/w/a.mp4", "/w/b.mp4"],
        ));
        assert_eq!(
            changes,
            [
                FileChange::Removed(PathBuf::from("/w/a.mp4")),
                FileChange::Created(PathBuf::from("/w/b.mp4")),
            ]
        );
    }

    #[test]
    fn test_rename_directions() {
        let to = classify_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/w/in.mp4"],
        ));
        assert_eq!(to, [FileChange::Created(PathBuf::from("/w/in.mp4"))]);

        let from = classify_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/w/out.mp4"],
        ));
        assert_eq!(from, [FileChange::Removed(PathBuf::from("/w/out.mp4"))]);
    }

    #[test]
    fn test_rename_any_uses_existence() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("here.mp4");
        std::fs::write(&present, b"x").unwrap();
        let absent = dir.path().join("gone.mp4");

        let mut ev = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any)));
        ev = ev.add_path(present.clone()).add_path(absent.clone());
        assert_eq!(
            classify_event(&ev),
            [FileChange::Created(present), FileChange::Removed(absent)]
        );
    }

    #[test]
    fn test_content_changes_are_ignored() {
        let changes = classify_event(&event(
            EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Content)),
            &["/w/a.mp4"],
        ));
        assert!(changes.is_empty());
    }
}
