//! Media file probing.
//!
//! Only the facts the conversion pipeline needs are extracted: the container
//! duration and the dimensions of the first video stream.

mod ffprobe;
mod types;

pub use ffprobe::{parse_ffprobe_json, probe_with_ffprobe};
pub use types::ProbeInfo;
