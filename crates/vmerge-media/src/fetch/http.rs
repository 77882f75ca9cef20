//! Plain HTTP(S) fetching for direct media links.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::redirect::Policy;
use tracing::{debug, info, warn};

use vmerge_models::MediaMode;

use super::guard::is_internal_host;
use super::{SourceFetcher, SourceStream};
use crate::error::{MediaError, MediaResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 10;

/// [`SourceFetcher`] that downloads the URL body as-is.
///
/// Redirects are followed only while each hop stays off internal hosts,
/// unless private targets are explicitly allowed.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(allow_private: bool) -> MediaResult<Self> {
        let redirects = Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if !allow_private && is_internal_host(attempt.url()) {
                warn!(target_url = %attempt.url(), "Refusing redirect to internal host");
                attempt.error("redirect to an internal host refused")
            } else {
                attempt.follow()
            }
        });

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(redirects)
            .user_agent(concat!("vmerge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MediaError::internal(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn open(&self, url: &str, mode: MediaMode) -> MediaResult<SourceStream> {
        if mode == MediaMode::AudioOnly {
            return Err(MediaError::source_unavailable(
                url,
                "audio extraction is not supported for direct downloads",
            ));
        }

        info!(url = %url, "Fetching source over HTTP");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MediaError::source_unavailable(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::source_unavailable(
                url,
                format!("HTTP {}", status),
            ));
        }

        let expected = response.content_length();
        debug!(url = %url, content_length = ?expected, "HTTP source responded");

        let state = BodyState {
            body: response.bytes_stream().boxed(),
            expected,
            received: 0,
            done: false,
        };

        let inner = stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    state.received += chunk.len() as u64;
                    Some((Ok(chunk), state))
                }
                Some(Err(e)) => {
                    state.done = true;
                    let err = MediaError::stream_interrupted(format!(
                        "body failed after {} bytes: {}",
                        state.received, e
                    ));
                    Some((Err(err), state))
                }
                None => {
                    state.done = true;
                    match state.expected {
                        Some(expected) if state.received < expected => {
                            let err = MediaError::stream_interrupted(format!(
                                "body ended after {} of {} bytes",
                                state.received, expected
                            ));
                            Some((Err(err), state))
                        }
                        _ => None,
                    }
                }
            }
        })
        .boxed();

        Ok(SourceStream::new(url, inner))
    }
}

struct BodyState {
    body: futures::stream::BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    expected: Option<u64>,
    received: u64,
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_downloads_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4-bytes".to_vec()))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(false).unwrap();
        let stream = fetcher
            .open(&format!("{}/clip.mp4", server.uri()), MediaMode::VideoAndAudio)
            .await
            .unwrap();

        let mut sink = Vec::new();
        let n = stream.write_to(&mut sink).await.unwrap();
        assert_eq!(n, 9);
        assert_eq!(sink, b"mp4-bytes");
    }

    #[tokio::test]
    async fn test_not_found_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(false).unwrap();
        let err = fetcher
            .open(&format!("{}/missing.mp4", server.uri()), MediaMode::VideoAndAudio)
            .await
            .unwrap_err();
        match err {
            MediaError::SourceUnavailable { message, .. } => assert!(message.contains("404")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_source_unavailable() {
        let fetcher = HttpFetcher::new(false).unwrap();
        let err = fetcher
            .open("http://127.0.0.1:1/clip.mp4", MediaMode::VideoAndAudio)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::SourceUnavailable { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_audio_mode_is_refused() {
        let fetcher = HttpFetcher::new(false).unwrap();
        let err = fetcher
            .open("http://127.0.0.1:1/clip.mp4", MediaMode::AudioOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_redirect_to_internal_host_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/public.mp4"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/private.mp4", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/private.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"secret".to_vec()))
            .mount(&server)
            .await;
        let url = format!("{}/public.mp4", server.uri());

        // The mock server itself lives on loopback, so the hop is internal.
        let err = HttpFetcher::new(false)
            .unwrap()
            .open(&url, MediaMode::VideoAndAudio)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::SourceUnavailable { .. }), "{err}");

        let mut sink = Vec::new();
        HttpFetcher::new(true)
            .unwrap()
            .open(&url, MediaMode::VideoAndAudio)
            .await
            .unwrap()
            .write_to(&mut sink)
            .await
            .unwrap();
        assert_eq!(sink, b"secret");
    }
}
