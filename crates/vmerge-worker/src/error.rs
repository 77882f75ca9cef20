//! Merge error types.

use thiserror::Error;
use vmerge_media::MediaError;

pub type MergeResult<T> = Result<T, MergeError>;

/// Broad failure class, used for status mapping and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeErrorKind {
    InvalidRequest,
    SourceUnavailable,
    StreamInterrupted,
    WorkspaceIo,
    TranscodeFailure,
    DeliveryError,
    Cancelled,
}

impl MergeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeErrorKind::InvalidRequest => "invalid_request",
            MergeErrorKind::SourceUnavailable => "source_unavailable",
            MergeErrorKind::StreamInterrupted => "stream_interrupted",
            MergeErrorKind::WorkspaceIo => "workspace_io",
            MergeErrorKind::TranscodeFailure => "transcode_failure",
            MergeErrorKind::DeliveryError => "delivery_error",
            MergeErrorKind::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Fetching source #{index} ({url}) failed: {source}")]
    Fetch {
        index: usize,
        url: String,
        #[source]
        source: MediaError,
    },

    #[error("Workspace error: {0}")]
    Workspace(#[source] MediaError),

    #[error("Transcode error: {0}")]
    Transcode(#[source] MediaError),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Merge cancelled")]
    Cancelled,
}

impl MergeError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    pub fn fetch(index: usize, url: impl Into<String>, source: MediaError) -> Self {
        if matches!(source, MediaError::Cancelled) {
            return Self::Cancelled;
        }
        Self::Fetch {
            index,
            url: url.into(),
            source,
        }
    }

    pub fn transcode(source: MediaError) -> Self {
        if matches!(source, MediaError::Cancelled) {
            return Self::Cancelled;
        }
        Self::Transcode(source)
    }

    pub fn kind(&self) -> MergeErrorKind {
        match self {
            MergeError::InvalidRequest(_) => MergeErrorKind::InvalidRequest,
            MergeError::Fetch { source, .. } => match source {
                MediaError::StreamInterrupted { .. } | MediaError::Timeout(_) => {
                    MergeErrorKind::StreamInterrupted
                }
                MediaError::WorkspaceIo { .. } | MediaError::Io(_) => MergeErrorKind::WorkspaceIo,
                MediaError::Cancelled => MergeErrorKind::Cancelled,
                _ => MergeErrorKind::SourceUnavailable,
            },
            MergeError::Workspace(_) => MergeErrorKind::WorkspaceIo,
            MergeError::Transcode(_) => MergeErrorKind::TranscodeFailure,
            MergeError::Delivery(_) => MergeErrorKind::DeliveryError,
            MergeError::Cancelled => MergeErrorKind::Cancelled,
        }
    }

    /// Diagnostic excerpt from an external process, for logs only.
    pub fn stderr_excerpt(&self) -> Option<&str> {
        match self {
            MergeError::Fetch { source, .. } | MergeError::Transcode(source) => {
                source.stderr_excerpt()
            }
            _ => None,
        }
    }

    /// Short message that is safe to show to callers: no paths, no stderr.
    pub fn public_message(&self) -> String {
        match self {
            MergeError::InvalidRequest(msg) => msg.clone(),
            MergeError::Fetch { index, .. } => match self.kind() {
                MergeErrorKind::StreamInterrupted => {
                    format!("Source #{} stopped before it was fully downloaded", index + 1)
                }
                MergeErrorKind::WorkspaceIo => "Failed to store downloaded media".to_string(),
                _ => format!("Source #{} could not be downloaded", index + 1),
            },
            MergeError::Workspace(_) => "Failed to prepare scratch storage".to_string(),
            MergeError::Transcode(_) => "Failed to merge videos".to_string(),
            MergeError::Delivery(_) => "Failed to deliver merged video".to_string(),
            MergeError::Cancelled => "Merge cancelled, server is shutting down".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_kinds() {
        let unavailable = MergeError::fetch(0, "u", MediaError::source_unavailable("u", "404"));
        assert_eq!(unavailable.kind(), MergeErrorKind::SourceUnavailable);

        let cut = MergeError::fetch(1, "u", MediaError::stream_interrupted("reset"));
        assert_eq!(cut.kind(), MergeErrorKind::StreamInterrupted);
        assert_eq!(
            cut.public_message(),
            "Source #2 stopped before it was fully downloaded"
        );

        let stalled = MergeError::fetch(0, "u", MediaError::Timeout(30));
        assert_eq!(stalled.kind(), MergeErrorKind::StreamInterrupted);
    }

    #[test]
    fn test_cancelled_collapses() {
        assert!(matches!(
            MergeError::fetch(0, "u", MediaError::Cancelled),
            MergeError::Cancelled
        ));
        assert!(matches!(
            MergeError::transcode(MediaError::Cancelled),
            MergeError::Cancelled
        ));
    }

    #[test]
    fn test_public_message_hides_diagnostics() {
        let err = MergeError::transcode(MediaError::transcode_failed(
            "ffmpeg exited with 1",
            Some("/tmp/vmerge/merge-x/filelist.txt: Invalid data".to_string()),
            Some(1),
        ));
        assert_eq!(err.kind(), MergeErrorKind::TranscodeFailure);
        assert!(err.stderr_excerpt().unwrap().contains("Invalid data"));
        assert!(!err.public_message().contains("/tmp"));
    }
}
