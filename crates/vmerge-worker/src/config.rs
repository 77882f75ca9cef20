//! Merge configuration.

use std::path::PathBuf;
use std::time::Duration;

use vmerge_media::MediaConfig;
use vmerge_models::DEFAULT_MAX_MERGE_SOURCES;

/// Merge orchestration settings.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Maximum URLs accepted per merge
    pub max_sources: usize,
    /// Root under which per-job workspaces are created
    pub scratch_dir: PathBuf,
    /// Per-source fetch timeout; `None` waits forever
    pub fetch_timeout: Option<Duration>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_sources: DEFAULT_MAX_MERGE_SOURCES,
            scratch_dir: MediaConfig::default().scratch_dir,
            fetch_timeout: Some(Duration::from_secs(1800)),
        }
    }
}

impl MergeConfig {
    /// Build from environment variables, sharing scratch root and fetch
    /// timeout with the media configuration.
    pub fn from_env(media: &MediaConfig) -> Self {
        Self {
            max_sources: std::env::var("MERGE_MAX_SOURCES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_MAX_MERGE_SOURCES),
            scratch_dir: media.scratch_dir.clone(),
            fetch_timeout: media.fetch_timeout,
        }
    }
}
