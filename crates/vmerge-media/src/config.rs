//! Media configuration.
//!
//! Built once at process start and shared read-only afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MediaError, MediaResult};

/// External tool locations, scratch root and stage timeouts.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// FFmpeg binary
    pub ffmpeg_path: PathBuf,
    /// yt-dlp binary
    pub ytdlp_path: PathBuf,
    /// Directory under which per-job workspaces are created
    pub scratch_dir: PathBuf,
    /// Kill the concat process after this long
    pub transcode_timeout: Option<Duration>,
    /// Abort a single source fetch after this long
    pub fetch_timeout: Option<Duration>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ytdlp_path: PathBuf::from("yt-dlp"),
            scratch_dir: std::env::temp_dir().join("vmerge"),
            transcode_timeout: Some(Duration::from_secs(1800)),
            fetch_timeout: Some(Duration::from_secs(1800)),
        }
    }
}

impl MediaConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ffmpeg_path: binary_from_env("FFMPEG_PATH", "ffmpeg"),
            ytdlp_path: binary_from_env("YTDLP_PATH", "yt-dlp"),
            scratch_dir: std::env::var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            transcode_timeout: timeout_from_env("TRANSCODE_TIMEOUT_SECS")
                .unwrap_or(defaults.transcode_timeout),
            fetch_timeout: timeout_from_env("FETCH_TIMEOUT_SECS").unwrap_or(defaults.fetch_timeout),
        }
    }

    /// Verify FFmpeg resolves to an executable.
    pub fn check_ffmpeg(&self) -> MediaResult<PathBuf> {
        which::which(&self.ffmpeg_path).map_err(|_| MediaError::FfmpegNotFound)
    }

    /// Verify yt-dlp resolves to an executable.
    pub fn check_ytdlp(&self) -> MediaResult<PathBuf> {
        which::which(&self.ytdlp_path).map_err(|_| MediaError::YtDlpNotFound)
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }
}

/// Explicit path from `var`, else whatever `which` finds, else the bare name.
fn binary_from_env(var: &str, name: &str) -> PathBuf {
    std::env::var(var)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| which::which(name).ok())
        .unwrap_or_else(|| PathBuf::from(name))
}

/// `Some(None)` when the variable is `0` (no timeout), `None` when unset or unparsable.
fn timeout_from_env(var: &str) -> Option<Option<Duration>> {
    let secs: u64 = std::env::var(var).ok()?.trim().parse().ok()?;
    if secs == 0 {
        Some(None)
    } else {
        Some(Some(Duration::from_secs(secs)))
    }
}
