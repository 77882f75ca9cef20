//! Error types for media operations.

use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while fetching, staging or concatenating media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found")]
    FfmpegNotFound,

    #[error("yt-dlp not found")]
    YtDlpNotFound,

    #[error("Source unavailable: {url}: {message}")]
    SourceUnavailable { url: String, message: String },

    #[error("Stream interrupted: {message}")]
    StreamInterrupted {
        message: String,
        stderr: Option<String>,
    },

    #[error("Workspace I/O error: {message}: {source}")]
    WorkspaceIo {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcode failed: {message}")]
    TranscodeFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid scratch path: {0}")]
    InvalidPath(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a source unavailable error.
    pub fn source_unavailable(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a stream interrupted error.
    pub fn stream_interrupted(message: impl Into<String>) -> Self {
        Self::StreamInterrupted {
            message: message.into(),
            stderr: None,
        }
    }

    /// Create a workspace I/O error.
    pub fn workspace_io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::WorkspaceIo {
            message: message.into(),
            source,
        }
    }

    /// Create a transcode failure error.
    pub fn transcode_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::TranscodeFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Diagnostic excerpt captured from an external process, if any.
    pub fn stderr_excerpt(&self) -> Option<&str> {
        match self {
            MediaError::StreamInterrupted { stderr, .. }
            | MediaError::TranscodeFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}
