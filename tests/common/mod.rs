//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which creates temporary watch, output and upload
//! directories, a config with short timings, and a full [`AppContext`] wired
//! to a [`FakeEncoder`] and [`FakeProber`] instead of ffmpeg.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use watchforge::config::Config;
use watchforge::context::AppContext;
use watchforge::conversion::{
    Dispatcher, EncodeProcess, EncodeRequest, Encoder, EncoderExit, JobReceiver,
};
use watchforge::error::EngineResult;
use watchforge::probe::{ProbeInfo, Prober};
use watchforge::server::create_router;
use watchforge::state::{Job, JobStatus};

/// Duration reported by [`FakeProber`].
pub const FAKE_DURATION: f64 = 10.0;

/// Exit code of an interrupted [`FakeEncoder`] run, like ffmpeg on SIGINT.
pub const INTERRUPTED_EXIT: i32 = 255;

/// How the fake encoder behaves for every launch.
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    pub exit_code: i32,
    pub steps: u32,
    pub step_delay: Duration,
    pub send_end: bool,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            exit_code: 0,
            steps: 4,
            step_delay: Duration::from_millis(10),
            send_end: true,
        }
    }
}

/// In-process encoder that writes the progress protocol to the job's
/// endpoint and creates the output file.
#[derive(Default)]
pub struct FakeEncoder {
    behavior: Mutex<FakeBehavior>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    launches: AtomicUsize,
    requests: Mutex<Vec<EncodeRequest>>,
}

impl FakeEncoder {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            ..Default::default()
        }
    }

    pub fn set_behavior(&self, behavior: FakeBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Highest number of simultaneously running encodes.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<EncodeRequest> {
        self.requests.lock().clone()
    }
}

impl Encoder for FakeEncoder {
    fn spawn(&self, request: EncodeRequest) -> EngineResult<Box<dyn EncodeProcess>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let behavior = self.behavior.lock().clone();
        let active = self.active.clone();
        let peak = self.peak.clone();
        let stop = CancellationToken::new();
        let task_stop = stop.clone();

        let handle = tokio::spawn(async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            let code = run_fake(&request, &behavior, &task_stop).await;
            active.fetch_sub(1, Ordering::SeqCst);
            code
        });

        Ok(Box::new(FakeProcess {
            handle,
            stop,
            exit: None,
        }))
    }
}

async fn run_fake(request: &EncodeRequest, behavior: &FakeBehavior, stop: &CancellationToken) -> i32 {
    if tokio::fs::write(&request.output, b"partial").await.is_err() {
        return 1;
    }

    let mut stream = match connect(&request.progress_url).await {
        Some(stream) => stream,
        None => return 1,
    };

    let steps = behavior.steps.max(1);
    for i in 1..=steps {
        tokio::select! {
            _ = tokio::time::sleep(behavior.step_delay) => {}
            _ = stop.cancelled() => return INTERRUPTED_EXIT,
        }
        let micros = (FAKE_DURATION * 1_000_000.0) as u64 * u64::from(i) / u64::from(steps);
        let block = format!("out_time_ms={}\nspeed=1.0x\nprogress=continue\n", micros);
        if stream.write_all(block.as_bytes()).await.is_err() {
            return 1;
        }
    }

    if behavior.send_end {
        let _ = stream.write_all(b"progress=end\n").await;
    }
    let _ = stream.shutdown().await;

    if behavior.exit_code == 0 {
        let _ = tokio::fs::write(&request.output, b"converted").await;
    }
    behavior.exit_code
}

async fn connect(url: &str) -> Option<Box<dyn AsyncWrite + Send + Unpin>> {
    #[cfg(unix)]
    if let Some(path) = url.strip_prefix("unix://") {
        let stream = tokio::net::UnixStream::connect(path).await.ok()?;
        return Some(Box::new(stream));
    }
    let addr = url.strip_prefix("tcp://")?;
    let stream = tokio::net::TcpStream::connect(addr).await.ok()?;
    Some(Box::new(stream))
}

struct FakeProcess {
    handle: JoinHandle<i32>,
    stop: CancellationToken,
    exit: Option<EncoderExit>,
}

#[async_trait]
impl EncodeProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    async fn wait(&mut self) -> std::io::Result<EncoderExit> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let code = (&mut self.handle).await.map_err(std::io::Error::other)?;
        let exit = EncoderExit { code: Some(code) };
        self.exit = Some(exit);
        Ok(exit)
    }

    async fn interrupt(&mut self, grace: Duration) -> std::io::Result<EncoderExit> {
        self.stop.cancel();
        match tokio::time::timeout(grace, self.wait()).await {
            Ok(exit) => exit,
            Err(_) => {
                self.handle.abort();
                Ok(EncoderExit { code: None })
            }
        }
    }
}

/// Prober that reports a fixed 1080p clip without touching the file.
#[derive(Debug, Default)]
pub struct FakeProber {
    /// Time each probe takes, like a slow ffprobe run.
    pub delay: Duration,
}

impl FakeProber {
    pub fn slow(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Prober for FakeProber {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn probe(&self, _path: &Path) -> watchforge_av::Result<ProbeInfo> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(ProbeInfo {
            duration_secs: FAKE_DURATION,
            width: 1920,
            height: 1080,
        })
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`] over temporary
/// directories.
pub struct TestHarness {
    pub ctx: AppContext,
    pub encoder: Arc<FakeEncoder>,
    pub root: tempfile::TempDir,
    rx: Option<JobReceiver>,
    dispatcher: Option<JoinHandle<()>>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with(|_| {}, FakeBehavior::default())
    }

    /// Build a harness, letting the caller adjust the test config.
    pub fn with(adjust: impl FnOnce(&mut Config), behavior: FakeBehavior) -> Self {
        Self::with_prober(adjust, behavior, FakeProber::default())
    }

    pub fn with_prober(
        adjust: impl FnOnce(&mut Config),
        behavior: FakeBehavior,
        prober: FakeProber,
    ) -> Self {
        let root = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = test_config(root.path());
        adjust(&mut config);

        for dir in [&config.watch.dir, &config.output.dir, &config.upload.dir] {
            std::fs::create_dir_all(dir).expect("failed to create test dir");
        }
        // Watcher events carry resolved paths, e.g. /private/var on macOS.
        config.watch.dir =
            std::fs::canonicalize(&config.watch.dir).expect("failed to resolve watch dir");

        let encoder = Arc::new(FakeEncoder::new(behavior));
        let (ctx, rx) = AppContext::new(
            config,
            encoder.clone(),
            Arc::new(prober),
            CancellationToken::new(),
        );

        Self {
            ctx,
            encoder,
            root,
            rx: Some(rx),
            dispatcher: None,
        }
    }

    /// Start the dispatcher. Jobs enqueued before this stay queued.
    pub fn start_dispatcher(&mut self) {
        if let Some(rx) = self.rx.take() {
            self.dispatcher = Some(Dispatcher::new(self.ctx.clone(), rx).spawn());
        }
    }

    pub fn watch_dir(&self) -> &Path {
        &self.ctx.config.watch.dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.ctx.config.output.dir
    }

    /// Create a source file in the watched directory.
    pub fn add_source(&self, name: &str) -> PathBuf {
        let path = self.watch_dir().join(name);
        std::fs::write(&path, b"source video bytes").expect("failed to write source");
        path
    }

    pub fn job_for(&self, path: &Path) -> Option<Job> {
        self.ctx.store.find_by_path(path)
    }

    /// Poll until the job for `path` satisfies `pred`.
    pub async fn wait_for_job(
        &self,
        path: &Path,
        pred: impl Fn(&Job) -> bool,
    ) -> Job {
        self.wait_until(|| self.job_for(path).filter(|job| pred(job)))
            .await
            .unwrap_or_else(|| {
                panic!(
                    "timed out waiting for job {:?}; current state {:?}",
                    path,
                    self.job_for(path)
                )
            })
    }

    pub async fn wait_for_status(&self, path: &Path, status: JobStatus) -> Job {
        self.wait_for_job(path, |job| job.status == status).await
    }

    /// Poll `check` for up to ten seconds.
    pub async fn wait_until<T>(&self, check: impl Fn() -> Option<T>) -> Option<T> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(value) = check() {
                return Some(value);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stop background work and wait for every conversion task.
    pub async fn shutdown(&mut self) {
        self.ctx.shutdown.cancel();
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.await;
        }
        self.ctx.tasks.close();
        self.ctx.tasks.wait().await;
    }

    /// Start an Axum server on a random port.
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");
        let app = create_router(self.ctx.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        addr
    }
}

/// Config rooted at `root` with timings short enough for tests.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.watch.dir = root.join("input");
    config.output.dir = root.join("output");
    config.upload.dir = root.join("upload");
    config.conversion.readiness_interval_ms = 10;
    config.conversion.readiness_checks = 2;
    config.conversion.auto_convert_poll_ms = 10;
    config.conversion.interrupt_grace_secs = 2;
    config.conversion.progress_wait_secs = 2;
    config
}
