//! FFprobe-based media probing.

use super::types::ProbeInfo;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Probe a media file using the ffprobe binary at `ffprobe`.
pub fn probe_with_ffprobe(path: &Path, ffprobe: &Path) -> Result<ProbeInfo> {
    if !path.exists() {
        return Err(Error::file_not_found(path));
    }

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffprobe")
            } else {
                Error::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool_failed("ffprobe", stderr.to_string()));
    }

    let json_str = String::from_utf8(output.stdout)
        .map_err(|e| Error::parse_error("ffprobe", format!("Invalid UTF-8: {}", e)))?;

    let info = parse_ffprobe_json(&json_str)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        path = %path.display(),
        duration = info.duration_secs,
        width = info.width,
        height = info.height,
        "Probed media file"
    );

    Ok(info)
}

/// Parse the JSON document printed by `ffprobe -show_format -show_streams`.
pub fn parse_ffprobe_json(json: &str) -> Result<ProbeInfo> {
    let output: FfprobeOutput = serde_json::from_str(json)?;

    let duration_secs = output
        .format
        .and_then(|f| f.duration)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    // First stream carrying real dimensions; cover art streams report zeros.
    let (width, height) = output
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref().map_or(true, |t| t == "video"))
        .filter_map(|s| match (s.width, s.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        })
        .next()
        .unwrap_or((0, 0));

    Ok(ProbeInfo {
        duration_secs,
        width,
        height,
    })
}
