//! External tool detection.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Information about an external tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// First line of the version banner, if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Check if a tool is available by running it with `version_arg`.
///
/// # Example
///
/// ```no_run
/// use watchforge_av::check_tool_with_arg;
///
/// let info = check_tool_with_arg("ffprobe", "-version");
/// if info.available {
///     println!("ffprobe version: {:?}", info.version);
/// }
/// ```
pub fn check_tool_with_arg(name: &str, version_arg: &str) -> ToolInfo {
    let result = Command::new(name).arg(version_arg).output();

    match result {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string());

            ToolInfo {
                name: name.to_string(),
                available: true,
                version,
                path: which::which(name).ok(),
            }
        }
        _ => ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check the tools the pipeline depends on.
///
/// `ffmpeg` and `ffprobe` may be overridden by configured paths.
pub fn check_tools(ffmpeg: &Path, ffprobe: &Path) -> Vec<ToolInfo> {
    let mut ffmpeg_info = check_tool_with_arg(&ffmpeg.to_string_lossy(), "-version");
    ffmpeg_info.name = "ffmpeg".to_string();
    let mut ffprobe_info = check_tool_with_arg(&ffprobe.to_string_lossy(), "-version");
    ffprobe_info.name = "ffprobe".to_string();
    vec![ffmpeg_info, ffprobe_info]
}

/// Require that a tool is available, returning its path.
///
/// # Errors
///
/// Returns an error if the tool is not found.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::tool_not_found(name))
}

/// Get the path to a tool, preferring a configured path over PATH lookup.
pub fn get_tool_path(name: &str, config_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = config_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }

    require_tool(name)
}
