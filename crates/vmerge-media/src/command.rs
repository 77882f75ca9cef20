//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// Lines of stderr kept for diagnostics.
pub const STDERR_TAIL_LINES: usize = 20;

/// Upper bound on the diagnostic excerpt, in bytes.
pub const STDERR_TAIL_BYTES: usize = 2048;

/// How long to keep reading stderr after the child exited.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path (or `pipe:0`)
    input: PathBuf,
    /// Output file path (or `pipe:1`)
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    /// Stream-copy concatenation of the files listed in a concat manifest.
    pub fn concat(manifest: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self::new(manifest, output)
            .input_args(["-f", "concat", "-safe", "0"])
            .output_args(["-c", "copy"])
    }

    /// Read any container on stdin, write the audio track as mp3 on stdout.
    pub fn extract_mp3_pipe() -> Self {
        Self::new("pipe:0", "pipe:1")
            .output_args(["-vn", "-c:a", "libmp3lame", "-q:a", "2", "-f", "mp3"])
    }

    /// Add input arguments (before -i).
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add output arguments (after -i).
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-v", "error"].map(String::from).to_vec();

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Bounded tail of a child process's stderr.
#[derive(Debug, Clone, Default)]
pub struct StderrTail {
    lines: VecDeque<String>,
}

impl StderrTail {
    /// Record a line, evicting the oldest once full.
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        if line.trim().is_empty() {
            return;
        }
        if self.lines.len() == STDERR_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Last lines joined, cut to at most [`STDERR_TAIL_BYTES`] keeping the end.
    pub fn excerpt(&self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }

        let joined = self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
        if joined.len() <= STDERR_TAIL_BYTES {
            return Some(joined);
        }

        let mut start = joined.len() - STDERR_TAIL_BYTES;
        while !joined.is_char_boundary(start) {
            start += 1;
        }
        Some(format!("...{}", &joined[start..]))
    }

    /// Drain a stderr pipe to EOF, keeping only the tail.
    pub async fn collect<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin,
    {
        let mut tail = Self::default();
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => tail.push(line),
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped reading child stderr: {}", e);
                    break;
                }
            }
        }
        tail
    }
}

/// Runner for FFmpeg commands with cancellation and timeout.
pub struct FfmpegRunner {
    /// FFmpeg binary
    program: PathBuf,
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    /// Create a new runner for the given FFmpeg binary.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            cancel_rx: None,
            timeout_secs: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command to completion.
    ///
    /// The child is killed if the returned future is dropped, the cancel
    /// signal flips to `true`, or the timeout elapses.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", self.program.display(), args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaError::FfmpegNotFound
                } else {
                    MediaError::Io(e)
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;
        let stderr_handle = tokio::spawn(StderrTail::collect(stderr));

        let result = self.wait_for_completion(&mut child).await;

        let tail = match result {
            Ok(_) => drain_stderr(stderr_handle).await,
            Err(_) => {
                stderr_handle.abort();
                StderrTail::default()
            }
        };

        let status = result?;
        if status.success() {
            Ok(())
        } else {
            Err(MediaError::transcode_failed(
                "FFmpeg exited with non-zero status",
                tail.excerpt(),
                status.code(),
            ))
        }
    }

    /// Wait for child process with cancellation and timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let cancelled = wait_for_cancel(self.cancel_rx.clone());
        let timed_out = async {
            match self.timeout_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            status = child.wait() => Ok(status?),
            _ = cancelled => {
                info!("FFmpeg cancelled, killing process");
                let _ = child.kill().await;
                Err(MediaError::Cancelled)
            }
            _ = timed_out => {
                let secs = self.timeout_secs.unwrap_or_default();
                warn!("FFmpeg timed out after {} seconds, killing process", secs);
                let _ = child.kill().await;
                Err(MediaError::Timeout(secs))
            }
        }
    }
}

/// Join a stderr collector, giving up if a leftover descendant keeps the pipe open.
pub async fn drain_stderr(mut handle: JoinHandle<StderrTail>) -> StderrTail {
    match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(tail)) => tail,
        Ok(Err(e)) => {
            debug!("Stderr collector failed: {}", e);
            StderrTail::default()
        }
        Err(_) => {
            handle.abort();
            StderrTail::default()
        }
    }
}

/// Resolves once the signal reads `true`; never resolves without a signal
/// or after every sender is gone.
pub async fn wait_for_cancel(cancel_rx: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = cancel_rx else {
        return std::future::pending().await;
    };

    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}
