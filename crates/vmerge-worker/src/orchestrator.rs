//! Merge orchestration.
//!
//! Fetches every source concurrently into a job workspace, writes the concat
//! manifest once all parts are complete, runs the transcoder and hands the
//! result back as a [`MergedOutput`]. The workspace is reclaimed on every
//! exit path.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::BufWriter;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info_span, warn, Instrument};

use vmerge_media::command::wait_for_cancel;
use vmerge_media::transcode::verify_output;
use vmerge_media::{
    Manifest, MediaError, MediaResult, SourceFetcher, TranscodeOutput, Transcoder, Workspace,
    MANIFEST_FILE_NAME, MERGED_FILE_NAME,
};
use vmerge_models::{FetchedPart, JobState, MediaMode};

use crate::config::MergeConfig;
use crate::error::{MergeError, MergeResult};
use crate::job::MergeJob;
use crate::metrics;
use crate::output::MergedOutput;

/// Runs merge jobs against a fetcher and a transcoder.
#[derive(Clone)]
pub struct MergeOrchestrator {
    fetcher: Arc<dyn SourceFetcher>,
    transcoder: Arc<dyn Transcoder>,
    config: MergeConfig,
}

impl MergeOrchestrator {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        transcoder: Arc<dyn Transcoder>,
        config: MergeConfig,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            config,
        }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Merge `urls` in the given order.
    ///
    /// Returns once the merged file is ready to stream. Setting `cancel` to
    /// `true` aborts the job at whatever stage it is in.
    pub async fn run(
        &self,
        urls: Vec<String>,
        cancel: watch::Receiver<bool>,
    ) -> MergeResult<MergedOutput> {
        if urls.is_empty() {
            return Err(MergeError::invalid_request("At least one URL is required"));
        }
        if urls.len() > self.config.max_sources {
            return Err(MergeError::invalid_request(format!(
                "Too many URLs: {} given, at most {} allowed",
                urls.len(),
                self.config.max_sources
            )));
        }

        let mut job = MergeJob::new(urls);
        let span = job.logger().create_span();
        job.logger()
            .log_start(&format!("merging {} sources", job.urls().len()));
        metrics::record_job_started(job.urls().len());

        async move {
            let mut workspace = match Workspace::create(&self.config.scratch_dir).await {
                Ok(workspace) => workspace,
                Err(e) => {
                    let err = MergeError::Workspace(e);
                    job.fail(&err);
                    return Err(err);
                }
            };

            match self.execute(&mut job, &mut workspace, cancel).await {
                Ok((output, file)) => {
                    job.transition(JobState::Streaming);
                    Ok(MergedOutput::new(job, workspace, file, output.size))
                }
                Err(err) => {
                    job.fail(&err);
                    workspace.destroy().await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        job: &mut MergeJob,
        workspace: &mut Workspace,
        cancel: watch::Receiver<bool>,
    ) -> MergeResult<(TranscodeOutput, tokio::fs::File)> {
        job.transition(JobState::Fetching);
        let parts = self.fetch_all(job, workspace, cancel.clone()).await?;

        job.transition(JobState::Manifesting);
        let manifest = Manifest::from_parts(&parts).map_err(MergeError::Workspace)?;
        let manifest_path = workspace
            .allocate_path(MANIFEST_FILE_NAME)
            .map_err(MergeError::Workspace)?;
        manifest
            .write_to(&manifest_path)
            .await
            .map_err(MergeError::Workspace)?;
        debug!(path = %manifest_path.display(), entries = manifest.len(), "Wrote manifest");

        if *cancel.borrow() {
            return Err(MergeError::Cancelled);
        }

        job.transition(JobState::Transcoding);
        let output_path = workspace
            .allocate_path(MERGED_FILE_NAME)
            .map_err(MergeError::Workspace)?;

        let start = Instant::now();
        let result = self
            .transcoder
            .concat(&manifest_path, &output_path, cancel)
            .await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::record_ffmpeg_duration(outcome, start.elapsed().as_secs_f64());
        let output = result.map_err(MergeError::transcode)?;

        // Any transcoder has to leave a real file behind, not just exit cleanly.
        let size = verify_output(&output.path)
            .await
            .map_err(MergeError::transcode)?;

        let file = tokio::fs::File::open(&output.path)
            .await
            .map_err(|e| MergeError::delivery(format!("cannot open merged output: {}", e)))?;

        Ok((TranscodeOutput { size, ..output }, file))
    }

    /// Fetch every source into its own part file, all at once.
    ///
    /// The first failure aborts the remaining fetches; later outcomes are
    /// only logged.
    async fn fetch_all(
        &self,
        job: &MergeJob,
        workspace: &mut Workspace,
        cancel: watch::Receiver<bool>,
    ) -> MergeResult<Vec<FetchedPart>> {
        let mut parts = Vec::with_capacity(job.urls().len());
        let mut tasks = JoinSet::new();

        for (index, url) in job.urls().iter().enumerate() {
            let path = workspace
                .allocate_path(&FetchedPart::file_name(index))
                .map_err(MergeError::Workspace)?;
            parts.push(FetchedPart::new(index, url.clone(), path.clone()));

            let fetcher = Arc::clone(&self.fetcher);
            let url = url.clone();
            let timeout = self.config.fetch_timeout;
            let span = info_span!("fetch", index, url = %url);
            tasks.spawn(
                async move {
                    let start = Instant::now();
                    let result = fetch_part(fetcher.as_ref(), &url, &path, timeout).await;
                    let outcome = if result.is_ok() { "success" } else { "failure" };
                    metrics::record_fetch_duration(outcome, start.elapsed().as_secs_f64());
                    (index, result)
                }
                .instrument(span),
            );
        }

        let mut first_error: Option<MergeError> = None;

        loop {
            let joined = tokio::select! {
                biased;
                next = tasks.join_next() => next,
                _ = wait_for_cancel(Some(cancel.clone())), if first_error.is_none() => {
                    job.logger().log_warning("cancelled while fetching");
                    tasks.abort_all();
                    first_error = Some(MergeError::Cancelled);
                    continue;
                }
            };

            let Some(joined) = joined else { break };

            match joined {
                Ok((index, Ok(bytes))) => {
                    parts[index].mark_complete(bytes);
                    debug!(index, bytes, "Part complete");
                }
                Ok((index, Err(e))) => {
                    parts[index].mark_failed();
                    let err = MergeError::fetch(index, parts[index].url.clone(), e);
                    if first_error.is_none() {
                        warn!(index, error = %err, "Fetch failed, aborting remaining fetches");
                        tasks.abort_all();
                        first_error = Some(err);
                    } else {
                        debug!(index, error = %err, "Fetch failed after job was aborted");
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    let err = MergeError::Workspace(MediaError::internal(format!(
                        "fetch task panicked: {}",
                        e
                    )));
                    if first_error.is_none() {
                        tasks.abort_all();
                        first_error = Some(err);
                    } else {
                        warn!(error = %err, "Fetch task failed after job was aborted");
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(parts),
        }
    }
}

impl std::fmt::Debug for MergeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Stream one source into `path`, returning the bytes written.
async fn fetch_part(
    fetcher: &dyn SourceFetcher,
    url: &str,
    path: &Path,
    timeout: Option<Duration>,
) -> MediaResult<u64> {
    let work = async {
        let stream = fetcher.open(url, MediaMode::VideoAndAudio).await?;
        let file = tokio::fs::File::create(path).await.map_err(|e| {
            MediaError::workspace_io(format!("cannot create {}", path.display()), e)
        })?;
        let mut writer = BufWriter::new(file);
        let written = stream.write_to(&mut writer).await?;
        if written == 0 {
            return Err(MediaError::source_unavailable(url, "source produced no data"));
        }
        Ok(written)
    };

    match timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| MediaError::Timeout(limit.as_secs()))?,
        None => work.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use tempfile::TempDir;
    use vmerge_media::{SourceStream, TranscodeResult};

    /// Serves canned bodies after a per-URL delay; unknown URLs are unreachable.
    struct FakeFetcher {
        sources: HashMap<String, (Duration, &'static str)>,
        /// Sources that break off after their first chunk
        truncated: HashSet<String>,
        /// Sources whose delay elapsed, in completion order
        finished: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(sources: &[(&str, u64, &'static str)]) -> Arc<Self> {
            Self::with_truncated(sources, &[])
        }

        fn with_truncated(sources: &[(&str, u64, &'static str)], truncated: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                sources: sources
                    .iter()
                    .map(|(url, ms, body)| (url.to_string(), (Duration::from_millis(*ms), *body)))
                    .collect(),
                truncated: truncated.iter().map(|url| url.to_string()).collect(),
                finished: Mutex::new(Vec::new()),
            })
        }

        fn finished(&self, url: &str) -> bool {
            self.finished.lock().unwrap().iter().any(|u| u == url)
        }
    }

    #[async_trait]
    impl SourceFetcher for FakeFetcher {
        async fn open(&self, url: &str, _mode: MediaMode) -> MediaResult<SourceStream> {
            let Some((delay, body)) = self.sources.get(url).copied() else {
                return Err(MediaError::source_unavailable(url, "connection refused"));
            };
            tokio::time::sleep(delay).await;
            self.finished.lock().unwrap().push(url.to_string());

            let mut chunks = vec![Ok(Bytes::from_static(body.as_bytes()))];
            if self.truncated.contains(url) {
                chunks.push(Err(MediaError::stream_interrupted("connection reset by peer")));
            }
            Ok(SourceStream::from_chunks(url, chunks))
        }
    }

    /// Concatenates the manifest entries itself and counts invocations.
    #[derive(Default)]
    struct SpyTranscoder {
        calls: AtomicUsize,
        empty_output: bool,
    }

    #[async_trait]
    impl Transcoder for SpyTranscoder {
        async fn concat(
            &self,
            manifest: &Path,
            output: &Path,
            _cancel: watch::Receiver<bool>,
        ) -> TranscodeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = tokio::fs::read_to_string(manifest).await?;
            let mut merged = Vec::new();
            if !self.empty_output {
                for entry in Manifest::parse(&text) {
                    merged.extend(tokio::fs::read(&entry).await?);
                }
            }
            tokio::fs::write(output, &merged).await?;
            Ok(TranscodeOutput {
                path: output.to_path_buf(),
                size: merged.len() as u64,
            })
        }
    }

    fn orchestrator(
        fetcher: Arc<dyn SourceFetcher>,
        transcoder: Arc<dyn Transcoder>,
        root: &Path,
    ) -> MergeOrchestrator {
        MergeOrchestrator::new(
            fetcher,
            transcoder,
            MergeConfig {
                max_sources: 4,
                scratch_dir: root.to_path_buf(),
                fetch_timeout: Some(Duration::from_secs(10)),
            },
        )
    }

    fn idle_signal() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn collect(output: MergedOutput) -> Vec<u8> {
        let mut stream = output.into_stream();
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        body
    }

    fn entries(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    /// Abandoned workspaces are removed in the background.
    async fn drained(root: &Path) -> bool {
        for _ in 0..200 {
            if entries(root) == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_output_follows_input_order() {
        let root = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new(&[("https://a", 500, "AAAA"), ("https://b", 50, "BB")]);
        let spy = Arc::new(SpyTranscoder::default());
        let orch = orchestrator(fetcher, spy.clone(), root.path());
        let (_tx, rx) = idle_signal();

        let output = orch.run(urls(&["https://a", "https://b"]), rx).await.unwrap();
        assert_eq!(output.len(), 6);
        assert_eq!(output.filename(), "mergedVideo.mp4");
        assert_eq!(entries(root.path()), 1);

        assert_eq!(collect(output).await, b"AAAABB");
        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_single_source_merge() {
        let root = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new(&[("https://a", 0, "only")]);
        let orch = orchestrator(fetcher, Arc::new(SpyTranscoder::default()), root.path());
        let (_tx, rx) = idle_signal();

        let output = orch.run(urls(&["https://a"]), rx).await.unwrap();
        assert_eq!(collect(output).await, b"only");
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_pending_fetches() {
        let root = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new(&[("https://a", 30_000, "AAAA")]);
        let spy = Arc::new(SpyTranscoder::default());
        let orch = orchestrator(fetcher.clone(), spy.clone(), root.path());
        let (_tx, rx) = idle_signal();

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            orch.run(urls(&["https://a", "https://unreachable"]), rx),
        )
        .await
        .expect("failed merge should not wait for the slow source")
        .unwrap_err();

        match err {
            MergeError::Fetch { index, .. } => assert_eq!(index, 1),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!fetcher.finished("https://a"));
        assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_truncated_source_fails_job() {
        let root = TempDir::new().unwrap();
        let fetcher = FakeFetcher::with_truncated(
            &[("https://a", 0, "AAAA"), ("https://b", 0, "BB")],
            &["https://a"],
        );
        let spy = Arc::new(SpyTranscoder::default());
        let orch = orchestrator(fetcher, spy.clone(), root.path());
        let (_tx, rx) = idle_signal();

        let err = orch.run(urls(&["https://a", "https://b"]), rx).await.unwrap_err();

        match &err {
            MergeError::Fetch { index, .. } => assert_eq!(*index, 0),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.kind(), crate::error::MergeErrorKind::StreamInterrupted);
        assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_abandoned_merge_releases_workspace() {
        let root = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new(&[("https://a", 30_000, "A"), ("https://b", 0, "B")]);
        let spy = Arc::new(SpyTranscoder::default());
        let orch = orchestrator(fetcher, spy.clone(), root.path());
        let (_tx, rx) = idle_signal();

        // The caller going away drops the run future mid-fetch.
        let task = tokio::spawn(async move { orch.run(urls(&["https://a", "https://b"]), rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(entries(root.path()), 1);
        task.abort();
        let _ = task.await;

        assert!(drained(root.path()).await);
        assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_transcode_output_fails() {
        let root = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new(&[("https://a", 0, "A"), ("https://b", 0, "B")]);
        let spy = Arc::new(SpyTranscoder {
            empty_output: true,
            ..SpyTranscoder::default()
        });
        let orch = orchestrator(fetcher, spy, root.path());
        let (_tx, rx) = idle_signal();

        let err = orch.run(urls(&["https://a", "https://b"]), rx).await.unwrap_err();
        assert!(matches!(err, MergeError::Transcode(_)), "{err}");
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_fetch() {
        let root = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new(&[("https://a", 30_000, "A"), ("https://b", 0, "B")]);
        let spy = Arc::new(SpyTranscoder::default());
        let orch = orchestrator(fetcher, spy.clone(), root.path());
        let (tx, rx) = idle_signal();

        let task = tokio::spawn(async move { orch.run(urls(&["https://a", "https://b"]), rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("cancelled merge should return promptly")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, MergeError::Cancelled), "{err}");
        assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_stalled_fetch_times_out() {
        let root = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new(&[("https://a", 30_000, "A")]);
        let orch = MergeOrchestrator::new(
            fetcher,
            Arc::new(SpyTranscoder::default()),
            MergeConfig {
                max_sources: 4,
                scratch_dir: root.path().to_path_buf(),
                fetch_timeout: Some(Duration::from_millis(100)),
            },
        );
        let (_tx, rx) = idle_signal();

        let err = orch.run(urls(&["https://a"]), rx).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::MergeErrorKind::StreamInterrupted);
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_dropped_output_still_cleans_up() {
        let root = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new(&[("https://a", 0, "AAAA")]);
        let orch = orchestrator(fetcher, Arc::new(SpyTranscoder::default()), root.path());
        let (_tx, rx) = idle_signal();

        let output = orch.run(urls(&["https://a"]), rx).await.unwrap();
        let mut stream = output.into_stream();
        let _ = stream.next().await;
        drop(stream);

        assert!(drained(root.path()).await);
    }

    #[tokio::test]
    async fn test_rejects_bad_source_counts() {
        let root = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new(&[]);
        let spy = Arc::new(SpyTranscoder::default());
        let orch = orchestrator(fetcher, spy, root.path());

        let (_tx, rx) = idle_signal();
        let err = orch.run(Vec::new(), rx).await.unwrap_err();
        assert!(matches!(err, MergeError::InvalidRequest(_)));

        let (_tx, rx) = idle_signal();
        let err = orch
            .run(urls(&["https://1", "https://2", "https://3", "https://4", "https://5"]), rx)
            .await
            .unwrap_err();
        assert!(matches!(err, MergeError::InvalidRequest(_)));
        assert_eq!(entries(root.path()), 0);
    }
}
