//! Application state.

use std::sync::Arc;

use tokio::sync::watch;

use vmerge_media::{FfmpegConcat, MediaConfig, MediaResult, SourceFetcher, SourceRouter, Transcoder};
use vmerge_worker::{MergeConfig, MergeOrchestrator};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub media: Arc<MediaConfig>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub orchestrator: Arc<MergeOrchestrator>,
    /// Flips to `true` when the server starts shutting down
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Create state wired to the real fetchers and FFmpeg.
    pub fn new(
        config: ApiConfig,
        media: MediaConfig,
        merge: MergeConfig,
        shutdown: watch::Receiver<bool>,
    ) -> MediaResult<Self> {
        let router = SourceRouter::from_config(&media, config.allow_private_urls)?;
        let fetcher: Arc<dyn SourceFetcher> = Arc::new(router);
        let transcoder: Arc<dyn Transcoder> = Arc::new(FfmpegConcat::new(&media));
        Ok(Self::with_components(
            config, media, merge, fetcher, transcoder, shutdown,
        ))
    }

    /// Create state from explicit components.
    pub fn with_components(
        config: ApiConfig,
        media: MediaConfig,
        merge: MergeConfig,
        fetcher: Arc<dyn SourceFetcher>,
        transcoder: Arc<dyn Transcoder>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let orchestrator = MergeOrchestrator::new(Arc::clone(&fetcher), transcoder, merge);
        Self {
            config,
            media: Arc::new(media),
            fetcher,
            orchestrator: Arc::new(orchestrator),
            shutdown,
        }
    }
}
