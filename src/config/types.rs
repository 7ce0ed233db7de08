use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory of the web UI bundle; served with an `index.html` fallback.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    /// Run only the pipeline, without the HTTP server.
    #[serde(default)]
    pub headless: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
            headless: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchConfig {
    #[serde(default = "default_watch_dir")]
    pub dir: PathBuf,

    /// Extra restriction on accepted extensions; empty means mp4/mov/avi/mkv.
    #[serde(default)]
    pub extensions: Vec<String>,
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from("./media/input")
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            dir: default_watch_dir(),
            extensions: Vec::new(),
        }
    }
}

impl WatchConfig {
    /// Whether a path in the watched directory should become a job.
    pub fn accepts(&self, path: &Path) -> bool {
        if !watchforge_common::paths::is_video_file(path) {
            return false;
        }
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.extensions
                    .iter()
                    .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./media/output")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Staging directory; finished uploads are moved into the watch directory.
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./media/upload")
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionConfig {
    /// Maximum simultaneous encoder processes (default: 1)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Capacity of the job queue; producers wait when it is full (default: 100)
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Start conversions automatically (default: true)
    #[serde(default = "default_true")]
    pub auto_convert: bool,

    /// Delete the source after a successful conversion (default: false)
    #[serde(default)]
    pub delete_after: bool,

    /// Convert even when the output file already exists (default: false)
    #[serde(default)]
    pub overwrite_existing: bool,

    /// Interval between file size samples (default: 5000)
    #[serde(default = "default_readiness_interval_ms")]
    pub readiness_interval_ms: u64,

    /// Size samples taken before giving up on a file (default: 10)
    #[serde(default = "default_readiness_checks")]
    pub readiness_checks: u32,

    /// Requeues allowed for a file that never settles, 0 for unlimited (default: 30)
    #[serde(default = "default_max_requeues")]
    pub max_requeues: u32,

    /// Poll interval while auto-convert is off (default: 2000)
    #[serde(default = "default_auto_convert_poll_ms")]
    pub auto_convert_poll_ms: u64,

    /// Time an interrupted encoder gets to exit before it is killed (default: 10)
    #[serde(default = "default_interrupt_grace_secs")]
    pub interrupt_grace_secs: u64,

    /// Time to drain the progress stream after the encoder exits (default: 5)
    #[serde(default = "default_progress_wait_secs")]
    pub progress_wait_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_max_concurrent() -> usize {
    1
}
fn default_max_queue_size() -> usize {
    100
}
fn default_readiness_interval_ms() -> u64 {
    5000
}
fn default_readiness_checks() -> u32 {
    10
}
fn default_max_requeues() -> u32 {
    30
}
fn default_auto_convert_poll_ms() -> u64 {
    2000
}
fn default_interrupt_grace_secs() -> u64 {
    10
}
fn default_progress_wait_secs() -> u64 {
    5
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_queue_size: default_max_queue_size(),
            auto_convert: default_true(),
            delete_after: false,
            overwrite_existing: false,
            readiness_interval_ms: default_readiness_interval_ms(),
            readiness_checks: default_readiness_checks(),
            max_requeues: default_max_requeues(),
            auto_convert_poll_ms: default_auto_convert_poll_ms(),
            interrupt_grace_secs: default_interrupt_grace_secs(),
            progress_wait_secs: default_progress_wait_secs(),
        }
    }
}

impl ConversionConfig {
    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }

    pub fn auto_convert_poll(&self) -> Duration {
        Duration::from_millis(self.auto_convert_poll_ms)
    }

    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_secs(self.interrupt_grace_secs)
    }

    pub fn progress_wait(&self) -> Duration {
        Duration::from_secs(self.progress_wait_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}
fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}
