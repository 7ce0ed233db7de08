//! Engine error type.
//!
//! Startup and CLI paths wrap these in `anyhow`; the HTTP layer maps them to
//! JSON bodies in [`crate::server::error`].

use crate::state::JobStatus;
use std::path::PathBuf;
use watchforge_common::JobId;

/// Failures inside the job-lifecycle engine that callers branch on.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The job is not in the store.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// The requested status change is not an edge of the job state machine.
    #[error("invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// The per-job progress endpoint could not be created.
    #[error("failed to set up progress endpoint: {0}")]
    ProgressEndpoint(#[source] std::io::Error),

    /// The encoder process could not be launched.
    #[error("failed to launch {}: {source}", program.display())]
    EncoderSpawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The job queue receiver is gone.
    #[error("job queue closed")]
    QueueClosed,
}

/// Result type alias using [`EngineError`].
pub type EngineResult<T> = std::result::Result<T, EngineError>;
