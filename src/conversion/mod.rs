//! Conversion engine.
//!
//! This module turns queued jobs into DNxHR HQ `.mov` files. It includes:
//!
//! - The bounded job queue and the dispatcher draining it
//! - The per-job conversion task (readiness, probe, encode, finalize)
//! - The out-of-band progress channel and its monitor
//! - The cancellation registry for interrupting in-flight encoders
//! - The encoder abstraction over the ffmpeg CLI

mod dispatcher;
mod encoder;
mod executor;
mod progress;
mod registry;

pub use dispatcher::{job_queue, Dispatcher, JobQueue, JobReceiver, QueueEntry};
pub use encoder::{EncodeProcess, EncodeRequest, Encoder, EncoderExit, FfmpegEncoder};
pub use executor::{wait_until_stable, ConversionTask};
pub use progress::{
    progress_fraction, ProgressEndpoint, ProgressEvent, ProgressMonitor, ProgressParser,
    ProgressReport, ProgressStream,
};
pub use registry::{remove_partial_output, CancellationRegistry};
