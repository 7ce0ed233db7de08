//! Probe result types.

use serde::{Deserialize, Serialize};

/// Duration and dimensions of a source file.
///
/// A failed probe degrades to [`ProbeInfo::default`], all zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeInfo {
    /// Container duration in seconds.
    pub duration_secs: f64,
    /// Width of the first video stream in pixels.
    pub width: u32,
    /// Height of the first video stream in pixels.
    pub height: u32,
}

impl ProbeInfo {
    /// Whether the first video stream is wider than it is tall.
    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }
}
