//! DNxHR encoder command line.
//!
//! Every conversion uses the same codec settings; only the scale filter
//! depends on the source dimensions.

use std::path::Path;

/// Upper bound for the short side of the output frame.
pub const MAX_SHORT_EDGE: u32 = 1080;

/// Inputs to [`dnxhr_args`].
#[derive(Debug, Clone, Copy)]
pub struct EncodeArgs<'a> {
    /// Source file.
    pub input: &'a Path,
    /// Destination file; overwritten if present.
    pub output: &'a Path,
    /// Progress endpoint URL handed to `-progress` (`unix://...` or `tcp://...`).
    pub progress_url: &'a str,
    /// Optional `-vf` filter, see [`scale_filter`].
    pub filter: Option<&'a str>,
}

/// Scale filter that caps the short side at 1080 pixels.
///
/// Landscape sources taller than 1080 are scaled to 1080 high; portrait or
/// square sources wider than 1080 are scaled to 1080 wide. The other side
/// keeps the aspect ratio, rounded to an even number.
///
/// # Examples
///
/// ```
/// use watchforge_av::scale_filter;
///
/// assert_eq!(scale_filter(3840, 2160), Some("scale=-2:1080"));
/// assert_eq!(scale_filter(2160, 3840), Some("scale=1080:-2"));
/// assert_eq!(scale_filter(1920, 1080), None);
/// ```
pub fn scale_filter(width: u32, height: u32) -> Option<&'static str> {
    if width > height && height > MAX_SHORT_EDGE {
        Some("scale=-2:1080")
    } else if height >= width && width > MAX_SHORT_EDGE {
        Some("scale=1080:-2")
    } else {
        None
    }
}

/// Build the ffmpeg argument list for a DNxHR HQ conversion.
pub fn dnxhr_args(args: &EncodeArgs<'_>) -> Vec<String> {
    let mut out = vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-progress".to_string(),
        args.progress_url.to_string(),
        "-i".to_string(),
        args.input.to_string_lossy().to_string(),
        // Video settings
        "-c:v".to_string(),
        "dnxhd".to_string(),
        "-profile:v".to_string(),
        "dnxhr_hq".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        // Audio settings
        "-c:a".to_string(),
        "pcm_s16le".to_string(),
    ];

    if let Some(filter) = args.filter {
        out.extend(["-vf".to_string(), filter.to_string()]);
    }

    out.extend([
        "-y".to_string(), // Overwrite
        args.output.to_string_lossy().to_string(),
    ]);

    out
}
