//! # watchforge-av
//!
//! Thin layer over the external media tools used by watchforge.
//!
//! This crate provides functionality for:
//! - Probing a source file for its duration and video dimensions (ffprobe)
//! - Building the fixed DNxHR encoder command line (ffmpeg)
//! - Detecting whether the required tools are installed
//!
//! ## Features
//!
//! - `probe` (default) - Media probing using the ffprobe CLI
//! - `tracing` - Enable tracing support
//!
//! ## Example
//!
//! ```no_run
//! use watchforge_av::probe;
//!
//! let info = probe("/path/to/clip.mp4")?;
//! println!("{}x{} for {:.1}s", info.width, info.height, info.duration_secs);
//! # Ok::<(), watchforge_av::Error>(())
//! ```

pub mod encode;
mod error;
#[cfg(feature = "probe")]
pub mod probe;
pub mod tools;

// Re-exports
pub use encode::{dnxhr_args, scale_filter, EncodeArgs};
pub use error::{Error, Result};
#[cfg(feature = "probe")]
pub use probe::ProbeInfo;
pub use tools::{check_tool_with_arg, check_tools, get_tool_path, ToolInfo};

/// Probe a media file with ffprobe found on `PATH`.
///
/// # Example
///
/// ```no_run
/// use watchforge_av::probe;
///
/// let info = probe("/path/to/clip.mov")?;
/// assert!(info.duration_secs >= 0.0);
/// # Ok::<(), watchforge_av::Error>(())
/// ```
#[cfg(feature = "probe")]
pub fn probe<P: AsRef<std::path::Path>>(path: P) -> Result<ProbeInfo> {
    probe::probe_with_ffprobe(path.as_ref(), std::path::Path::new("ffprobe"))
}
