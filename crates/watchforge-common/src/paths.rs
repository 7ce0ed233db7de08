//! Path conventions for source discovery and converted output.

use std::path::{Path, PathBuf};

/// Source extensions the pipeline converts (compared case-insensitively).
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

/// Suffix appended to the source stem to name the converted file.
pub const OUTPUT_SUFFIX: &str = "_dnxhr";

/// Container extension of converted files.
pub const OUTPUT_EXTENSION: &str = "mov";

/// Check if a path has a recognized video extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use watchforge_common::paths::is_video_file;
///
/// assert!(is_video_file(Path::new("/watch/clip.mkv")));
/// assert!(is_video_file(Path::new("CLIP.MOV")));
/// assert!(!is_video_file(Path::new("clip.webm")));
/// ```
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Deterministic output location for a source file.
///
/// The basename without its extension gets [`OUTPUT_SUFFIX`] and the `.mov`
/// extension, placed directly under `output_dir`.
pub fn converted_output_path(source: &Path, output_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output_dir.join(format!("{stem}{OUTPUT_SUFFIX}.{OUTPUT_EXTENSION}"))
}
