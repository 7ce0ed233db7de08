//! Encoder process abstraction.
//!
//! Production uses [`FfmpegEncoder`]; tests plug in an in-process encoder
//! that speaks the same progress protocol.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use watchforge_av::{dnxhr_args, EncodeArgs};
use watchforge_common::JobId;

/// Everything needed to start one conversion.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub job_id: JobId,
    pub input: PathBuf,
    pub output: PathBuf,
    pub progress_url: String,
    pub filter: Option<String>,
}

/// How an encoder process exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderExit {
    /// Exit code, `None` if terminated by a signal.
    pub code: Option<i32>,
}

impl EncoderExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl std::fmt::Display for EncoderExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// Starts encoder processes.
pub trait Encoder: Send + Sync {
    fn spawn(&self, request: EncodeRequest) -> EngineResult<Box<dyn EncodeProcess>>;
}

/// A running encoder.
#[async_trait]
pub trait EncodeProcess: Send {
    /// OS process ID, if there is one.
    fn id(&self) -> Option<u32>;

    /// Wait for exit. Must be cancel-safe.
    async fn wait(&mut self) -> std::io::Result<EncoderExit>;

    /// Ask the process to stop, killing it after `grace`.
    async fn interrupt(&mut self, grace: Duration) -> std::io::Result<EncoderExit>;
}

/// Runs the ffmpeg CLI.
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Encoder for FfmpegEncoder {
    fn spawn(&self, request: EncodeRequest) -> EngineResult<Box<dyn EncodeProcess>> {
        let args = dnxhr_args(&EncodeArgs {
            input: &request.input,
            output: &request.output,
            progress_url: &request.progress_url,
            filter: request.filter.as_deref(),
        });

        tracing::debug!(job_id = %request.job_id, "FFmpeg args: {:?}", args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::EncoderSpawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(stderr) = child.stderr.take() {
            let job_id = request.job_id;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!(job_id = %job_id, "ffmpeg: {}", line);
                }
            });
        }

        Ok(Box::new(FfmpegProcess { child }))
    }
}

struct FfmpegProcess {
    child: Child,
}

#[async_trait]
impl EncodeProcess for FfmpegProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> std::io::Result<EncoderExit> {
        let status = self.child.wait().await?;
        Ok(EncoderExit {
            code: status.code(),
        })
    }

    async fn interrupt(&mut self, grace: Duration) -> std::io::Result<EncoderExit> {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
                tracing::debug!(pid, "SIGINT failed: {}", e);
            }

            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(status) => {
                    return Ok(EncoderExit {
                        code: status?.code(),
                    })
                }
                Err(_) => tracing::warn!(pid, "Encoder ignored SIGINT for {:?}, killing", grace),
            }
        }

        #[cfg(not(unix))]
        let _ = grace;

        self.child.kill().await?;
        self.wait().await
    }
}
