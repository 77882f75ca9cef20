//! Source fetchers.
//!
//! A fetcher resolves a remote URL into a sequential byte stream. Failures
//! travel in-band: a stream that ends without an error item delivered every
//! byte, a stream whose last item is an error was truncated.

mod guard;
mod http;
mod router;
mod ytdlp;

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use vmerge_models::MediaMode;

use crate::error::{MediaError, MediaResult};

pub use guard::is_internal_host;
pub use http::HttpFetcher;
pub use router::{is_direct_media_url, is_supported_url, SourceRouter};
pub use ytdlp::YtDlpFetcher;

/// Chunked media bytes with in-band failures.
pub type ByteStream = BoxStream<'static, MediaResult<Bytes>>;

/// Opens remote sources as byte streams.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Start fetching `url` in the given mode.
    ///
    /// Errors returned here mean nothing could be opened; errors yielded by
    /// the stream mean the transfer broke off.
    async fn open(&self, url: &str, mode: MediaMode) -> MediaResult<SourceStream>;
}

/// Sequential byte stream of one source.
pub struct SourceStream {
    url: String,
    inner: ByteStream,
}

impl SourceStream {
    pub fn new(url: impl Into<String>, inner: ByteStream) -> Self {
        Self {
            url: url.into(),
            inner,
        }
    }

    /// Stream over in-memory chunks.
    pub fn from_chunks<I>(url: impl Into<String>, chunks: I) -> Self
    where
        I: IntoIterator<Item = MediaResult<Bytes>>,
        I::IntoIter: Send + 'static,
    {
        Self::new(url, stream::iter(chunks).boxed())
    }

    /// Pull the first chunk so open-time failures surface before anything is
    /// committed downstream. The chunk is put back in front of the stream.
    pub async fn prime(mut self) -> MediaResult<Self> {
        match self.inner.next().await {
            Some(Ok(first)) => {
                let rest = std::mem::replace(&mut self.inner, stream::empty().boxed());
                self.inner = stream::once(async move { Ok(first) }).chain(rest).boxed();
                Ok(self)
            }
            Some(Err(e)) => Err(e),
            None => Err(MediaError::source_unavailable(
                self.url.clone(),
                "source produced no data",
            )),
        }
    }

    /// Copy every chunk into `sink`, returning the byte count.
    ///
    /// The sink is flushed only after the stream ended cleanly; any in-band
    /// error is returned instead so a truncated copy never looks complete.
    pub async fn write_to<W>(mut self, sink: &mut W) -> MediaResult<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0u64;
        while let Some(chunk) = self.inner.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;
        Ok(written)
    }
}

impl Stream for SourceStream {
    type Item = MediaResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStream").field("url", &self.url).finish()
    }
}
