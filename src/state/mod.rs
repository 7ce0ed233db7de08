//! Job store: the single source of truth for job state.
//!
//! Every read returns a clone and every write happens under one lock, so no
//! caller ever holds the store lock while notifying subscribers.

mod types;

pub use types::*;

use crate::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use watchforge_common::JobId;

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    /// Discovery order, used for snapshots.
    order: Vec<JobId>,
}

/// Result of [`JobStore::remove_for_source`].
#[derive(Debug, Clone, PartialEq)]
pub enum Removal {
    /// The job already consumed its source; nothing changed.
    Ignored(Job),
    /// The job was dropped from the store.
    Removed {
        job: Job,
        /// It was Processing and has been marked Cancelled first.
        was_processing: bool,
    },
}

/// Result of [`JobStore::insert_for_source`].
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion {
    /// The job is now tracked. A finished job for the same source, if any,
    /// was dropped in its place.
    Inserted { replaced: Option<Job> },
    /// An active job already covers the source; nothing changed.
    Duplicate(Job),
}

#[derive(Default)]
pub struct JobStore {
    inner: Mutex<Inner>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All jobs in discovery order.
    pub fn snapshot(&self) -> Vec<Job> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.inner.lock().jobs.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace a job.
    pub fn upsert(&self, job: Job) {
        let mut inner = self.inner.lock();
        if inner.jobs.insert(job.id, job.clone()).is_none() {
            inner.order.push(job.id);
        }
    }

    /// Track a newly discovered source unless an active job already covers
    /// it, in one critical section.
    ///
    /// Discovery probes the file before inserting, so two discoverers can
    /// race on the same path; only the first insert wins.
    pub fn insert_for_source(&self, job: Job) -> Insertion {
        let mut inner = self.inner.lock();
        let mut replaced = None;
        if let Some(id) = find_id(&inner, &job.file_path) {
            if let Some(existing) = inner.jobs.get(&id).filter(|j| j.is_active()) {
                return Insertion::Duplicate(existing.clone());
            }
            replaced = inner.jobs.remove(&id);
            inner.order.retain(|other| *other != id);
        }
        inner.order.push(job.id);
        inner.jobs.insert(job.id, job);
        Insertion::Inserted { replaced }
    }

    pub fn remove(&self, id: JobId) -> Option<Job> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.remove(&id)?;
        inner.order.retain(|other| *other != id);
        Some(job)
    }

    /// Find the job for a source path, preferring one that is still active.
    pub fn find_by_path(&self, path: &Path) -> Option<Job> {
        let inner = self.inner.lock();
        find_id(&inner, path).and_then(|id| inner.jobs.get(&id).cloned())
    }

    /// Set progress (clamped to 0..=100) on a Processing job.
    ///
    /// Returns the updated job, or `None` when the job is gone or no longer
    /// Processing.
    pub fn update_progress(&self, id: JobId, progress: f32) -> Option<Job> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.get_mut(&id)?;
        if job.status != JobStatus::Processing {
            return None;
        }
        job.progress = progress.clamp(0.0, 100.0);
        Some(job.clone())
    }

    /// Record a probed duration.
    pub fn set_duration(&self, id: JobId, duration: f64) -> Option<Job> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.get_mut(&id)?;
        job.duration = duration;
        Some(job.clone())
    }

    /// Move a job along one edge of the state machine.
    pub fn transition(&self, id: JobId, to: JobStatus) -> EngineResult<Job> {
        let mut inner = self.inner.lock();
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or(EngineError::JobNotFound(id))?;
        if !job.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                id,
                from: job.status,
                to,
            });
        }
        job.status = to;
        Ok(job.clone())
    }

    /// Compare-and-set a Processing job to its final state.
    ///
    /// The first caller wins; later calls (or calls for a job that is gone)
    /// return `None` and change nothing.
    pub fn finalize(&self, id: JobId, outcome: Outcome) -> Option<Job> {
        self.finalize_with(id, || outcome)
    }

    /// Like [`finalize`](Self::finalize), but `decide` runs under the store
    /// lock and only if the job is still Processing.
    ///
    /// Used when deciding the outcome has a side effect (deleting the source)
    /// that must not race with source-removal handling.
    pub fn finalize_with<F>(&self, id: JobId, decide: F) -> Option<Job>
    where
        F: FnOnce() -> Outcome,
    {
        let mut inner = self.inner.lock();
        let job = inner.jobs.get_mut(&id)?;
        if job.status != JobStatus::Processing {
            return None;
        }
        let outcome = decide();
        job.status = outcome.status();
        if matches!(outcome, Outcome::Completed { .. }) {
            job.progress = 100.0;
        }
        Some(job.clone())
    }

    /// Handle the disappearance of a source file in one critical section.
    ///
    /// CompleteDeleted jobs are left alone. A Processing job is marked
    /// Cancelled before it is removed, which makes any later finalize a
    /// no-op.
    pub fn remove_for_source(&self, path: &Path) -> Option<Removal> {
        let mut inner = self.inner.lock();
        let id = find_id(&inner, path)?;
        let job = inner.jobs.get_mut(&id)?;

        if job.status == JobStatus::CompleteDeleted {
            return Some(Removal::Ignored(job.clone()));
        }

        let was_processing = job.status == JobStatus::Processing;
        if was_processing {
            job.status = JobStatus::Cancelled;
        }

        let job = inner.jobs.remove(&id)?;
        inner.order.retain(|other| *other != id);
        Some(Removal::Removed {
            job,
            was_processing,
        })
    }
}

fn find_id(inner: &Inner, path: &Path) -> Option<JobId> {
    let mut fallback = None;
    for id in inner.order.iter().rev() {
        if let Some(job) = inner.jobs.get(id) {
            if job.file_path == path {
                if job.is_active() {
                    return Some(*id);
                }
                fallback.get_or_insert(*id);
            }
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::path::PathBuf;

    fn processing(store: &JobStore, path: &str) -> Job {
        let job = Job::new(PathBuf::from(path), 10.0);
        store.upsert(job.clone());
        store.transition(job.id, JobStatus::Processing).unwrap()
    }

    #[test]
    fn test_snapshot_keeps_discovery_order() {
        let store = JobStore::new();
        let a = Job::new(PathBuf::from("/w/b.mp4"), 0.0);
        let b = Job::new(PathBuf::from("/w/a.mp4"), 0.0);
        store.upsert(a.clone());
        store.upsert(b.clone());
        store.upsert(a.clone());
        let ids: Vec<_> = store.snapshot().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, [a.id, b.id]);
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let store = JobStore::new();
        let job = Job::new(PathBuf::from("/w/a.mp4"), 0.0);
        store.upsert(job.clone());
        let err = store.transition(job.id, JobStatus::Completed).unwrap_err();
        assert_matches!(
            err,
            EngineError::InvalidTransition {
                from: JobStatus::Queued,
                to: JobStatus::Completed,
                ..
            }
        );
        assert_eq!(store.get(job.id).unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn test_transition_missing_job() {
        let store = JobStore::new();
        assert_matches!(
            store.transition(JobId::new(), JobStatus::Processing),
            Err(EngineError::JobNotFound(_))
        );
    }

    #[test]
    fn test_progress_only_while_processing() {
        let store = JobStore::new();
        let job = Job::new(PathBuf::from("/w/a.mp4"), 10.0);
        store.upsert(job.clone());
        assert!(store.update_progress(job.id, 50.0).is_none());

        store.transition(job.id, JobStatus::Processing).unwrap();
        let updated = store.update_progress(job.id, 150.0).unwrap();
        assert_eq!(updated.progress, 100.0);
    }

    #[test]
    fn test_finalize_first_caller_wins() {
        let store = JobStore::new();
        let job = processing(&store, "/w/a.mp4");

        let first = store.finalize(job.id, Outcome::Cancelled).unwrap();
        assert_eq!(first.status, JobStatus::Cancelled);

        let second = store.finalize(
            job.id,
            Outcome::Completed {
                source_deleted: false,
            },
        );
        assert!(second.is_none());
        assert_eq!(store.get(job.id).unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn test_finalize_with_skips_decision_when_not_processing() {
        let store = JobStore::new();
        let job = Job::new(PathBuf::from("/w/a.mp4"), 0.0);
        store.upsert(job.clone());
        let mut called = false;
        let result = store.finalize_with(job.id, || {
            called = true;
            Outcome::Cancelled
        });
        assert!(result.is_none());
        assert!(!called);
    }

    #[test]
    fn test_completed_sets_full_progress() {
        let store = JobStore::new();
        let job = processing(&store, "/w/a.mp4");
        let done = store
            .finalize(
                job.id,
                Outcome::Completed {
                    source_deleted: true,
                },
            )
            .unwrap();
        assert_eq!(done.status, JobStatus::CompleteDeleted);
        assert_eq!(done.progress, 100.0);
    }

    #[test]
    fn test_find_by_path_prefers_active_job() {
        let store = JobStore::new();
        let old = Job::already_converted(PathBuf::from("/w/a.mp4"), 0.0);
        let new = Job::new(PathBuf::from("/w/a.mp4"), 0.0);
        store.upsert(new.clone());
        store.upsert(old.clone());
        assert_eq!(store.find_by_path(Path::new("/w/a.mp4")).unwrap().id, new.id);
        assert!(store.find_by_path(Path::new("/w/b.mp4")).is_none());
    }

    #[test]
    fn test_insert_for_source_keeps_first_active_job() {
        let store = JobStore::new();
        let first = Job::new(PathBuf::from("/w/a.mp4"), 0.0);
        let second = Job::new(PathBuf::from("/w/a.mp4"), 0.0);

        assert_eq!(
            store.insert_for_source(first.clone()),
            Insertion::Inserted { replaced: None }
        );
        assert_matches!(
            store.insert_for_source(second.clone()),
            Insertion::Duplicate(ref job) if job.id == first.id
        );
        assert_eq!(store.len(), 1);
        assert!(store.get(second.id).is_none());
    }

    #[test]
    fn test_insert_for_source_replaces_finished_job() {
        let store = JobStore::new();
        let old = Job::already_converted(PathBuf::from("/w/a.mp4"), 0.0);
        store.upsert(old.clone());

        let new = Job::new(PathBuf::from("/w/a.mp4"), 0.0);
        assert_matches!(
            store.insert_for_source(new.clone()),
            Insertion::Inserted { replaced: Some(ref job) } if job.id == old.id
        );
        let ids: Vec<_> = store.snapshot().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, [new.id]);
    }

    #[test]
    fn test_remove_for_source_cancels_processing() {
        let store = JobStore::new();
        let job = processing(&store, "/w/a.mp4");

        let removal = store.remove_for_source(Path::new("/w/a.mp4")).unwrap();
        assert_matches!(
            removal,
            Removal::Removed { ref job, was_processing: true } if job.status == JobStatus::Cancelled
        );
        assert!(store.get(job.id).is_none());
        assert!(store.finalize(job.id, Outcome::Cancelled).is_none());
        assert!(store.remove_for_source(Path::new("/w/a.mp4")).is_none());
    }

    #[test]
    fn test_remove_for_source_ignores_complete_deleted() {
        let store = JobStore::new();
        let job = processing(&store, "/w/a.mp4");
        store.finalize(
            job.id,
            Outcome::Completed {
                source_deleted: true,
            },
        );

        let removal = store.remove_for_source(Path::new("/w/a.mp4")).unwrap();
        assert_matches!(removal, Removal::Ignored(_));
        assert_eq!(store.len(), 1);
    }
}
