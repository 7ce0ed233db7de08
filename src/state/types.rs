use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use watchforge_common::JobId;

/// One source file's conversion.
///
/// Serialized as `{"id", "filePath", "status", "progress", "duration"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub file_path: PathBuf,
    pub status: JobStatus,
    /// Percent complete, 0 to 100.
    pub progress: f32,
    /// Probed duration in seconds; 0 when unknown.
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    #[serde(rename = "completed-deleted")]
    CompleteDeleted,
    Rejected,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Everything except Queued and Processing.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::CompleteDeleted => "completed-deleted",
            JobStatus::Rejected => "rejected",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Edges of the job state machine.
    ///
    /// The readiness requeue is a self-loop on Queued with no status change,
    /// so it is not listed here.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Queued, Rejected)
                | (Queued, Failed)
                | (Processing, Completed)
                | (Processing, CompleteDeleted)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a Processing job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Encoder exited zero after reporting completion.
    Completed { source_deleted: bool },
    /// Encoder or its setup failed; the reason is only logged.
    Failed { reason: String },
    /// Interrupted because the source went away or the service is stopping.
    Cancelled,
}

impl Outcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Outcome::Completed {
                source_deleted: true,
            } => JobStatus::CompleteDeleted,
            Outcome::Completed {
                source_deleted: false,
            } => JobStatus::Completed,
            Outcome::Failed { .. } => JobStatus::Failed,
            Outcome::Cancelled => JobStatus::Cancelled,
        }
    }
}

impl Job {
    pub fn new(file_path: PathBuf, duration: f64) -> Self {
        Self {
            id: JobId::new(),
            file_path,
            status: JobStatus::Queued,
            progress: 0.0,
            duration,
        }
    }

    /// A job whose output was already present when it was discovered.
    pub fn already_converted(file_path: PathBuf, duration: f64) -> Self {
        Self {
            status: JobStatus::Completed,
            progress: 100.0,
            ..Self::new(file_path, duration)
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}
