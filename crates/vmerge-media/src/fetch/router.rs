//! Picks a fetcher per URL.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use vmerge_models::MediaMode;

use super::{HttpFetcher, SourceFetcher, SourceStream, YtDlpFetcher};
use crate::config::MediaConfig;
use crate::error::MediaResult;

const SUPPORTED_DOMAINS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "twitter.com",
    "x.com",
    "twitch.tv",
    "tiktok.com",
    "instagram.com",
    "facebook.com",
    "dailymotion.com",
];

const DIRECT_MEDIA_EXTENSIONS: &[&str] = &[".mp4", ".m4v", ".mov", ".webm", ".mkv"];

/// Whether the URL's host is a sharing platform known to work with yt-dlp.
///
/// yt-dlp is still used for other hosts; this only drives logging.
pub fn is_supported_url(url: &str) -> bool {
    let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase))
    else {
        return false;
    };

    SUPPORTED_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)))
}

/// Whether the URL path points straight at a media file.
pub fn is_direct_media_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path().to_lowercase();
    DIRECT_MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// [`SourceFetcher`] that sends direct media links in video mode over plain
/// HTTP and everything else through yt-dlp.
#[derive(Clone)]
pub struct SourceRouter {
    http: Arc<dyn SourceFetcher>,
    ytdlp: Arc<dyn SourceFetcher>,
}

impl SourceRouter {
    pub fn new(http: Arc<dyn SourceFetcher>, ytdlp: Arc<dyn SourceFetcher>) -> Self {
        Self { http, ytdlp }
    }

    /// Real fetchers. `allow_private` lets direct downloads follow redirects
    /// onto internal hosts.
    pub fn from_config(config: &MediaConfig, allow_private: bool) -> MediaResult<Self> {
        Ok(Self::new(
            Arc::new(HttpFetcher::new(allow_private)?),
            Arc::new(YtDlpFetcher::new(config)),
        ))
    }

    fn select(&self, url: &str, mode: MediaMode) -> &Arc<dyn SourceFetcher> {
        if mode == MediaMode::VideoAndAudio && is_direct_media_url(url) {
            &self.http
        } else {
            &self.ytdlp
        }
    }
}

#[async_trait]
impl SourceFetcher for SourceRouter {
    async fn open(&self, url: &str, mode: MediaMode) -> MediaResult<SourceStream> {
        if !is_supported_url(url) && !is_direct_media_url(url) {
            tracing::debug!(url = %url, "Host not in the known platform list, trying yt-dlp anyway");
        }
        self.select(url, mode).open(url, mode).await
    }
}

impl std::fmt::Debug for SourceRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRouter").finish_non_exhaustive()
    }
}
