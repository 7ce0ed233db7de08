//! Source file probing.

pub use watchforge_av::{check_tools, ProbeInfo, ToolInfo};

use watchforge_av::get_tool_path;

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extracts duration and dimensions from a media file.
pub trait Prober: Send + Sync {
    /// Human-readable name identifying this prober implementation.
    fn name(&self) -> &'static str;

    /// Probe a media file at the given path.
    fn probe(&self, path: &Path) -> watchforge_av::Result<ProbeInfo>;
}

/// Prober backed by the ffprobe CLI.
pub struct FfprobeProber {
    program: PathBuf,
}

impl FfprobeProber {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    fn probe(&self, path: &Path) -> watchforge_av::Result<ProbeInfo> {
        watchforge_av::probe::probe_with_ffprobe(path, &self.program)
    }
}

/// Resolve a configured tool to the binary that will actually run.
///
/// An existing file at the configured location is used as is; anything else
/// is looked up on `PATH`. A tool that cannot be found keeps its configured
/// value, and each launch then fails on its own.
pub fn resolve_tool(configured: &Path) -> PathBuf {
    match get_tool_path(&configured.to_string_lossy(), Some(configured)) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("{}, keeping configured {:?}", e, configured);
            configured.to_path_buf()
        }
    }
}

/// Probe off the async runtime, degrading to zeros on any failure.
pub async fn probe_or_default(prober: Arc<dyn Prober>, path: &Path) -> ProbeInfo {
    let owned = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || prober.probe(&owned)).await;

    match result {
        Ok(Ok(info)) => info,
        Ok(Err(e)) => {
            tracing::warn!(path = %path.display(), "Probe failed, using zero duration: {}", e);
            ProbeInfo::default()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "Probe task failed: {}", e);
            ProbeInfo::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl Prober for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn probe(&self, _path: &Path) -> watchforge_av::Result<ProbeInfo> {
            Err(watchforge_av::Error::tool_not_found("ffprobe"))
        }
    }

    #[tokio::test]
    async fn test_probe_failure_degrades_to_zero() {
        let info = probe_or_default(Arc::new(Broken), Path::new("/w/a.mp4")).await;
        assert_eq!(info, ProbeInfo::default());
    }

    #[test]
    fn test_resolve_tool() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("ffmpeg-custom");
        std::fs::write(&local, b"").unwrap();
        assert_eq!(resolve_tool(&local), local);

        let missing = Path::new("nonexistent_ffmpeg_12345");
        assert_eq!(resolve_tool(missing), missing);
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_tool_searches_path() {
        let resolved = resolve_tool(Path::new("sh"));
        assert!(resolved.is_absolute());
        assert_eq!(resolved.file_name().unwrap(), "sh");
    }

    #[tokio::test]
    async fn test_ffprobe_prober_missing_file() {
        let prober = FfprobeProber::new("ffprobe");
        assert_eq!(prober.name(), "ffprobe");
        let info = probe_or_default(Arc::new(prober), Path::new("/nonexistent/a.mp4")).await;
        assert_eq!(info.duration_secs, 0.0);
    }
}
