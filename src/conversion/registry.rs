//! Lookup of in-flight conversions, used to interrupt them.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use watchforge_common::JobId;

struct Entry {
    token: CancellationToken,
    output_path: PathBuf,
}

/// Maps a Processing job to the token that interrupts its encoder and the
/// output file it is writing.
#[derive(Default)]
pub struct CancellationRegistry {
    entries: Mutex<HashMap<JobId, Entry>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a conversion about to launch. Replaces any stale entry.
    pub fn register(&self, id: JobId, token: CancellationToken, output_path: PathBuf) {
        self.entries.lock().insert(id, Entry { token, output_path });
    }

    /// Forget a conversion. Returns `false` if it was not registered.
    pub fn unregister(&self, id: JobId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interrupt a conversion, delete its partial output and unregister it.
    ///
    /// Returns `false` if nothing was registered for `id`.
    pub fn cancel(&self, id: JobId) -> bool {
        let Some(entry) = self.entries.lock().remove(&id) else {
            return false;
        };

        tracing::info!(job_id = %id, output = %entry.output_path.display(), "Cancelling conversion");
        entry.token.cancel();
        remove_partial_output(&entry.output_path);
        true
    }
}

/// Delete a partial output file; a missing file is not an error.
pub fn remove_partial_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "Failed to remove partial output: {}", e),
    }
}
