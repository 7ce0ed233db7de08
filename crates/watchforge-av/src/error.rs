//! Errors raised while running ffmpeg and ffprobe.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Neither the configured path nor a `PATH` lookup found the binary.
    #[error("{tool} not found")]
    ToolNotFound { tool: String },

    /// The tool ran but exited unsuccessfully.
    #[error("{tool} failed: {stderr}")]
    ToolFailed { tool: String, stderr: String },

    #[error("unreadable {tool} output: {message}")]
    ParseError { tool: String, message: String },

    #[error("source file missing: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed ffprobe JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    pub fn tool_failed(tool: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            stderr: stderr.into(),
        }
    }

    pub fn parse_error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }
}
