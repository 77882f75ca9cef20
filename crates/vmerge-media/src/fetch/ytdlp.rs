//! Source fetching with yt-dlp.
//!
//! yt-dlp writes the selected format to stdout (`-o -`). Audio-only fetches
//! are piped through FFmpeg so the caller receives an actual mp3 stream.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use vmerge_models::MediaMode;

use super::{SourceFetcher, SourceStream};
use crate::command::{drain_stderr, FfmpegCommand, StderrTail};
use crate::config::MediaConfig;
use crate::error::{MediaError, MediaResult};

/// Single-file format with both tracks; merged formats cannot go to stdout.
const VIDEO_FORMAT: &str =
    "best[ext=mp4][vcodec!=none][acodec!=none]/best[vcodec!=none][acodec!=none]/best";

const AUDIO_FORMAT: &str = "bestaudio[ext=m4a]/bestaudio/best";

/// [`SourceFetcher`] backed by the yt-dlp CLI.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    ytdlp_path: PathBuf,
    ffmpeg_path: PathBuf,
}

impl YtDlpFetcher {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            ytdlp_path: config.ytdlp_path.clone(),
            ffmpeg_path: config.ffmpeg_path.clone(),
        }
    }

    /// yt-dlp arguments for `url` in `mode`.
    pub fn build_args(url: &str, mode: MediaMode) -> Vec<String> {
        let format = match mode {
            MediaMode::VideoAndAudio => VIDEO_FORMAT,
            MediaMode::AudioOnly => AUDIO_FORMAT,
        };

        [
            "--no-playlist",
            "--no-progress",
            "--no-part",
            "--quiet",
            "--no-warnings",
            "-f",
            format,
            "-o",
            "-",
            "--",
            url,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn spawn_ytdlp(&self, url: &str, mode: MediaMode) -> MediaResult<Child> {
        let args = Self::build_args(url, mode);
        debug!("Running yt-dlp: {} {}", self.ytdlp_path.display(), args.join(" "));

        Command::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaError::YtDlpNotFound
                } else {
                    MediaError::Io(e)
                }
            })
    }

    fn spawn_mp3_encoder(&self, input: ChildStdout) -> MediaResult<Child> {
        let stdin: Stdio = input.try_into()?;
        let args = FfmpegCommand::extract_mp3_pipe().build_args();
        debug!("Running FFmpeg: {} {}", self.ffmpeg_path.display(), args.join(" "));

        Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaError::FfmpegNotFound
                } else {
                    MediaError::Io(e)
                }
            })
    }
}

#[async_trait]
impl SourceFetcher for YtDlpFetcher {
    async fn open(&self, url: &str, mode: MediaMode) -> MediaResult<SourceStream> {
        info!(url = %url, mode = %mode, "Fetching source with yt-dlp");

        let mut ytdlp = self.spawn_ytdlp(url, mode)?;
        let ytdlp_stdout = take_stdout(&mut ytdlp)?;
        let mut stages = vec![Stage::new("yt-dlp", ytdlp)?];

        let stdout = match mode {
            MediaMode::VideoAndAudio => ytdlp_stdout,
            MediaMode::AudioOnly => {
                let mut ffmpeg = self.spawn_mp3_encoder(ytdlp_stdout)?;
                let stdout = take_stdout(&mut ffmpeg)?;
                stages.push(Stage::new("ffmpeg", ffmpeg)?);
                stdout
            }
        };

        let pipe = Pipeline {
            url: url.to_string(),
            reader: ReaderStream::new(stdout),
            stages,
            bytes_emitted: 0,
            finished: false,
        };

        let inner = stream::unfold(pipe, |mut pipe| async move {
            if pipe.finished {
                return None;
            }
            match pipe.reader.next().await {
                Some(Ok(chunk)) => {
                    pipe.bytes_emitted += chunk.len() as u64;
                    Some((Ok(chunk), pipe))
                }
                Some(Err(e)) => {
                    pipe.finished = true;
                    let err = MediaError::stream_interrupted(format!("read error: {}", e));
                    Some((Err(err), pipe))
                }
                None => {
                    pipe.finished = true;
                    match pipe.finish().await {
                        Ok(()) => None,
                        Err(e) => Some((Err(e), pipe)),
                    }
                }
            }
        })
        .boxed();

        Ok(SourceStream::new(url, inner))
    }
}

fn take_stdout(child: &mut Child) -> MediaResult<ChildStdout> {
    child
        .stdout
        .take()
        .ok_or_else(|| MediaError::internal("child stdout not captured"))
}

/// One process in the fetch pipeline.
struct Stage {
    name: &'static str,
    child: Child,
    stderr: JoinHandle<StderrTail>,
}

impl Stage {
    fn new(name: &'static str, mut child: Child) -> MediaResult<Self> {
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("child stderr not captured"))?;
        Ok(Self {
            name,
            child,
            stderr: tokio::spawn(StderrTail::collect(stderr)),
        })
    }
}

/// Live processes plus the stdout of the last one.
struct Pipeline {
    url: String,
    reader: ReaderStream<ChildStdout>,
    stages: Vec<Stage>,
    bytes_emitted: u64,
    finished: bool,
}

impl Pipeline {
    /// Reap every stage after EOF; the first unsuccessful one decides the error.
    async fn finish(&mut self) -> MediaResult<()> {
        let mut first_failure = None;

        for stage in self.stages.drain(..) {
            let Stage {
                name,
                mut child,
                stderr,
            } = stage;

            let status = child.wait().await?;
            let tail = drain_stderr(stderr).await;

            if status.success() {
                continue;
            }

            warn!(
                url = %self.url,
                stage = name,
                exit_code = ?status.code(),
                bytes = self.bytes_emitted,
                "Fetch process failed"
            );

            if first_failure.is_none() {
                first_failure = Some((name, status.code(), tail));
            }
        }

        let Some((name, code, tail)) = first_failure else {
            info!(url = %self.url, bytes = self.bytes_emitted, "Source fetch finished");
            return Ok(());
        };

        let reason = tail
            .excerpt()
            .and_then(|e| e.lines().last().map(str::to_string))
            .unwrap_or_else(|| format!("{} exited with status {:?}", name, code));

        if self.bytes_emitted == 0 {
            Err(MediaError::source_unavailable(self.url.clone(), reason))
        } else {
            Err(MediaError::StreamInterrupted {
                message: format!("{} failed after {} bytes: {}", name, self.bytes_emitted, reason),
                stderr: tail.excerpt(),
            })
        }
    }
}
