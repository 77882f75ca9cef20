//! Merge job definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a merge job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a merge job.
///
/// ```text
/// Created -> Fetching -> Manifesting -> Transcoding -> Streaming -> Done
///    \__________\____________\_____________\_____________\--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Created,
    Fetching,
    Manifesting,
    Transcoding,
    Streaming,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Fetching => "fetching",
            JobState::Manifesting => "manifesting",
            JobState::Transcoding => "transcoding",
            JobState::Streaming => "streaming",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == JobState::Failed {
            return true;
        }
        matches!(
            (self, next),
            (JobState::Created, JobState::Fetching)
                | (JobState::Fetching, JobState::Manifesting)
                | (JobState::Manifesting, JobState::Transcoding)
                | (JobState::Transcoding, JobState::Streaming)
                | (JobState::Streaming, JobState::Done)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Completion state of a single fetched part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartStatus {
    #[default]
    Pending,
    Complete,
    Failed,
}

/// One source URL materialized as a local file inside a job workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPart {
    /// Position in the caller-supplied URL list
    pub index: usize,
    /// Source URL
    pub url: String,
    /// Local file path (allocated by the workspace)
    pub path: PathBuf,
    /// Completion state
    pub status: PartStatus,
    /// Bytes written once complete
    pub bytes_written: u64,
}

impl FetchedPart {
    /// Create a pending part.
    pub fn new(index: usize, url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            url: url.into(),
            path: path.into(),
            status: PartStatus::Pending,
            bytes_written: 0,
        }
    }

    /// Scratch file name for the part at `index`.
    pub fn file_name(index: usize) -> String {
        format!("video{}.mp4", index)
    }

    /// Mark the part complete. A part that already completed is left untouched.
    pub fn mark_complete(&mut self, bytes_written: u64) {
        if self.status == PartStatus::Pending {
            self.status = PartStatus::Complete;
            self.bytes_written = bytes_written;
        }
    }

    /// Mark the part failed. Completed parts are immutable.
    pub fn mark_failed(&mut self) {
        if self.status == PartStatus::Pending {
            self.status = PartStatus::Failed;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == PartStatus::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            JobState::Created,
            JobState::Fetching,
            JobState::Manifesting,
            JobState::Transcoding,
            JobState::Streaming,
            JobState::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failed_reachable_from_non_terminal() {
        for state in [
            JobState::Created,
            JobState::Fetching,
            JobState::Manifesting,
            JobState::Transcoding,
            JobState::Streaming,
        ] {
            assert!(state.can_transition_to(JobState::Failed));
        }
        assert!(!JobState::Done.can_transition_to(JobState::Failed));
        assert!(!JobState::Failed.can_transition_to(JobState::Fetching));
    }

    #[test]
    fn test_no_skipping_stages() {
        assert!(!JobState::Fetching.can_transition_to(JobState::Transcoding));
        assert!(!JobState::Created.can_transition_to(JobState::Streaming));
    }

    #[test]
    fn test_completed_part_is_immutable() {
        let mut part = FetchedPart::new(0, "https://example.com/a", "/tmp/video0.mp4");
        part.mark_complete(42);
        part.mark_failed();
        part.mark_complete(7);
        assert_eq!(part.status, PartStatus::Complete);
        assert_eq!(part.bytes_written, 42);
    }

    #[test]
    fn test_part_file_name() {
        assert_eq!(FetchedPart::file_name(3), "video3.mp4");
    }
}
