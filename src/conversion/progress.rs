//! Out-of-band progress channel.
//!
//! The encoder is started with `-progress <url>` and connects back to a
//! job-scoped endpoint, writing `key=value` lines. Only two keys matter:
//! `out_time_ms` (which despite its name carries microseconds) and
//! `progress=end`.

use crate::error::{EngineError, EngineResult};
use crate::notifications::{Hub, MessageType};
use crate::state::JobStore;
use regex::Regex;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use watchforge_common::JobId;

/// Stream accepted from the encoder.
pub type ProgressStream = Box<dyn AsyncRead + Send + Unpin>;

/// A listening endpoint that accepts exactly one peer.
#[derive(Debug)]
pub enum ProgressEndpoint {
    /// Unix-domain socket in the temp directory; the file is removed on drop.
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        path: PathBuf,
    },
    /// Loopback TCP on an ephemeral port.
    Tcp {
        listener: TcpListener,
        addr: SocketAddr,
    },
}

impl ProgressEndpoint {
    /// Bind the platform's default endpoint for `job_id`.
    #[cfg(unix)]
    pub async fn bind(job_id: JobId) -> EngineResult<Self> {
        Self::bind_in(&std::env::temp_dir(), job_id).await
    }

    /// Bind a Unix socket for `job_id` under `dir`.
    ///
    /// Socket paths are capped at roughly 100 bytes; a longer path falls
    /// back to loopback TCP.
    #[cfg(unix)]
    pub async fn bind_in(dir: &Path, job_id: JobId) -> EngineResult<Self> {
        let path = dir.join(format!("watchforge-{}.sock", job_id));
        // Leftover from a crashed run.
        let _ = std::fs::remove_file(&path);
        match UnixListener::bind(&path) {
            Ok(listener) => Ok(Self::Unix { listener, path }),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {
                tracing::debug!(
                    job_id = %job_id,
                    path = %path.display(),
                    "Socket path unusable ({}), using TCP progress endpoint",
                    e
                );
                Self::bind_tcp().await
            }
            Err(e) => Err(EngineError::ProgressEndpoint(e)),
        }
    }

    #[cfg(not(unix))]
    pub async fn bind(_job_id: JobId) -> EngineResult<Self> {
        Self::bind_tcp().await
    }

    /// Bind a loopback TCP endpoint regardless of platform.
    pub async fn bind_tcp() -> EngineResult<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(EngineError::ProgressEndpoint)?;
        let addr = listener
            .local_addr()
            .map_err(EngineError::ProgressEndpoint)?;
        Ok(Self::Tcp { listener, addr })
    }

    /// URL to pass to the encoder's `-progress` option.
    pub fn url(&self) -> String {
        match self {
            #[cfg(unix)]
            Self::Unix { path, .. } => format!("unix://{}", path.display()),
            Self::Tcp { addr, .. } => format!("tcp://{}", addr),
        }
    }

    /// Wait for the encoder to connect.
    pub async fn accept(&self) -> std::io::Result<ProgressStream> {
        match self {
            #[cfg(unix)]
            Self::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(Box::new(stream))
            }
            Self::Tcp { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(Box::new(stream))
            }
        }
    }
}

impl Drop for ProgressEndpoint {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Self::Unix { path, .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// One meaningful line of the progress stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    /// Encoded position in seconds.
    OutTime(f64),
    /// The encoder finished writing.
    End,
}

/// Line parser for the progress protocol.
pub struct ProgressParser {
    out_time: Regex,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self {
            out_time: Regex::new(r"^out_time_ms=(\d+)$").expect("static progress pattern"),
        }
    }

    pub fn parse_line(&self, line: &str) -> Option<ProgressEvent> {
        let line = line.trim();
        if line == "progress=end" {
            return Some(ProgressEvent::End);
        }
        let caps = self.out_time.captures(line)?;
        let micros: u64 = caps.get(1)?.as_str().parse().ok()?;
        Some(ProgressEvent::OutTime(micros as f64 / 1_000_000.0))
    }
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Fraction of `duration` reached at `seconds`, clamped to (0, 1].
///
/// Returns `None` when either value gives no usable fraction.
pub fn progress_fraction(seconds: f64, duration: f64) -> Option<f64> {
    if duration.is_nan() || seconds.is_nan() || duration <= 0.0 || seconds <= 0.0 {
        return None;
    }
    Some((seconds / duration).min(1.0))
}

/// What the monitor saw before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressReport {
    /// `progress=end` was received.
    pub saw_end: bool,
    /// Last fraction reported, 0 if none.
    pub last_fraction: f64,
}

/// Reads one job's progress stream and forwards it to the store and hub.
pub struct ProgressMonitor {
    job_id: JobId,
    duration: f64,
    store: Arc<JobStore>,
    hub: Arc<Hub>,
    parser: ProgressParser,
}

impl ProgressMonitor {
    pub fn new(job_id: JobId, duration: f64, store: Arc<JobStore>, hub: Arc<Hub>) -> Self {
        Self {
            job_id,
            duration,
            store,
            hub,
            parser: ProgressParser::new(),
        }
    }

    /// Accept the encoder's connection and read until end, EOF, error or
    /// cancellation.
    pub fn spawn(
        self,
        endpoint: ProgressEndpoint,
        cancel: CancellationToken,
    ) -> JoinHandle<ProgressReport> {
        tokio::spawn(async move { self.run(endpoint, cancel).await })
    }

    async fn run(self, endpoint: ProgressEndpoint, cancel: CancellationToken) -> ProgressReport {
        let mut report = ProgressReport::default();

        let stream = tokio::select! {
            accepted = endpoint.accept() => match accepted {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(job_id = %self.job_id, "Progress endpoint accept failed: {}", e);
                    return report;
                }
            },
            _ = cancel.cancelled() => return report,
        };
        // One peer only.
        drop(endpoint);

        let mut lines = BufReader::new(stream).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = cancel.cancelled() => break,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(job_id = %self.job_id, "Progress stream read failed: {}", e);
                    break;
                }
            };

            match self.parser.parse_line(&line) {
                Some(ProgressEvent::End) => {
                    report.saw_end = true;
                    report.last_fraction = 1.0;
                    if let Some(job) = self.store.update_progress(self.job_id, 100.0) {
                        self.hub.publish_job(MessageType::UpdateFile, true, &job);
                    }
                    break;
                }
                Some(ProgressEvent::OutTime(seconds)) => {
                    let Some(fraction) = progress_fraction(seconds, self.duration) else {
                        continue;
                    };
                    report.last_fraction = fraction;
                    if let Some(job) = self
                        .store
                        .update_progress(self.job_id, (fraction * 100.0) as f32)
                    {
                        self.hub.publish_job(MessageType::UpdateFile, false, &job);
                    }
                }
                None => {}
            }
        }

        tracing::debug!(
            job_id = %self.job_id,
            saw_end = report.saw_end,
            "Progress monitor stopped"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Job, JobStatus};
    use std::path::PathBuf;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_parse_out_time_is_microseconds() {
        let parser = ProgressParser::new();
        assert_eq!(
            parser.parse_line("out_time_ms=2500000"),
            Some(ProgressEvent::OutTime(2.5))
        );
        assert_eq!(parser.parse_line("progress=end\r"), Some(ProgressEvent::End));
        assert_eq!(parser.parse_line("progress=continue"), None);
        assert_eq!(parser.parse_line("out_time_ms=N/A"), None);
        assert_eq!(parser.parse_line("out_time=00:00:02.500000"), None);
    }

    #[test]
    fn test_fraction_clamped() {
        assert_eq!(progress_fraction(5.0, 10.0), Some(0.5));
        assert_eq!(progress_fraction(12.0, 10.0), Some(1.0));
        assert_eq!(progress_fraction(0.0, 10.0), None);
        assert_eq!(progress_fraction(5.0, 0.0), None);
    }

    #[tokio::test]
    async fn test_tcp_endpoint_url() {
        let endpoint = ProgressEndpoint::bind_tcp().await.unwrap();
        assert!(endpoint.url().starts_with("tcp://127.0.0.1:"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_socket_removed_on_drop() {
        let endpoint = ProgressEndpoint::bind(JobId::new()).await.unwrap();
        let path = match &endpoint {
            ProgressEndpoint::Unix { path, .. } => path.clone(),
            ProgressEndpoint::Tcp { .. } => unreachable!(),
        };
        assert!(path.exists());
        assert!(endpoint.url().starts_with("unix://"));
        drop(endpoint);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_long_socket_dir_falls_back_to_tcp() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("d".repeat(120));
        std::fs::create_dir(&dir).unwrap();

        let endpoint = ProgressEndpoint::bind_in(&dir, JobId::new()).await.unwrap();
        assert!(endpoint.url().starts_with("tcp://127.0.0.1:"));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_socket_dir_is_an_error() {
        let err = ProgressEndpoint::bind_in(Path::new("/nonexistent/watchforge"), JobId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ProgressEndpoint(_)));
    }

    #[tokio::test]
    async fn test_monitor_updates_store_and_sees_end() {
        let store = Arc::new(JobStore::new());
        let hub = Arc::new(Hub::new(store.clone()));
        let job = Job::new(PathBuf::from("/w/a.mp4"), 10.0);
        store.upsert(job.clone());
        store.transition(job.id, JobStatus::Processing).unwrap();

        let endpoint = ProgressEndpoint::bind_tcp().await.unwrap();
        let addr = endpoint.url().trim_start_matches("tcp://").to_string();
        let handle = ProgressMonitor::new(job.id, 10.0, store.clone(), hub)
            .spawn(endpoint, CancellationToken::new());

        let mut peer = tokio::net::TcpStream::connect(addr).await.unwrap();
        peer.write_all(b"frame=10\nout_time_ms=5000000\nprogress=continue\n")
            .await
            .unwrap();
        peer.write_all(b"out_time_ms=10000000\nprogress=end\n")
            .await
            .unwrap();

        let report = handle.await.unwrap();
        assert!(report.saw_end);
        assert_eq!(store.get(job.id).unwrap().progress, 100.0);
    }

    #[tokio::test]
    async fn test_monitor_eof_without_end() {
        let store = Arc::new(JobStore::new());
        let hub = Arc::new(Hub::new(store.clone()));
        let job = Job::new(PathBuf::from("/w/a.mp4"), 10.0);
        store.upsert(job.clone());
        store.transition(job.id, JobStatus::Processing).unwrap();

        let endpoint = ProgressEndpoint::bind_tcp().await.unwrap();
        let addr = endpoint.url().trim_start_matches("tcp://").to_string();
        let handle = ProgressMonitor::new(job.id, 10.0, store.clone(), hub)
            .spawn(endpoint, CancellationToken::new());

        let mut peer = tokio::net::TcpStream::connect(addr).await.unwrap();
        peer.write_all(b"out_time_ms=2500000\n").await.unwrap();
        drop(peer);

        let report = handle.await.unwrap();
        assert!(!report.saw_end);
        assert_eq!(report.last_fraction, 0.25);
        assert_eq!(store.get(job.id).unwrap().progress, 25.0);
    }

    #[tokio::test]
    async fn test_monitor_cancelled_before_connect() {
        let store = Arc::new(JobStore::new());
        let hub = Arc::new(Hub::new(store.clone()));
        let endpoint = ProgressEndpoint::bind_tcp().await.unwrap();
        let cancel = CancellationToken::new();
        let handle =
            ProgressMonitor::new(JobId::new(), 10.0, store, hub).spawn(endpoint, cancel.clone());
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), ProgressReport::default());
    }
}
