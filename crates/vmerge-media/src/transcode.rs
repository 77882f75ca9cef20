//! Stream-copy concatenation via FFmpeg.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::config::MediaConfig;
use crate::error::{MediaError, MediaResult};

/// Output file name inside a job workspace.
pub const MERGED_FILE_NAME: &str = "mergedVideo.mp4";

/// A produced, non-empty output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutput {
    pub path: PathBuf,
    pub size: u64,
}

/// Outcome of one concat run: the produced file, or a failure with diagnostics.
pub type TranscodeResult = MediaResult<TranscodeOutput>;

/// Joins the files listed in a manifest into one output without re-encoding.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Concatenate the manifest's entries into `output`.
    ///
    /// Must stop the underlying work once `cancel` reads `true`.
    async fn concat(
        &self,
        manifest: &Path,
        output: &Path,
        cancel: watch::Receiver<bool>,
    ) -> TranscodeResult;
}

/// [`Transcoder`] backed by the FFmpeg concat demuxer.
#[derive(Debug, Clone)]
pub struct FfmpegConcat {
    ffmpeg_path: PathBuf,
    timeout_secs: Option<u64>,
}

impl FfmpegConcat {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            timeout_secs: config.transcode_timeout.map(|d| d.as_secs().max(1)),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegConcat {
    async fn concat(
        &self,
        manifest: &Path,
        output: &Path,
        cancel: watch::Receiver<bool>,
    ) -> TranscodeResult {
        let cmd = FfmpegCommand::concat(manifest, output);

        let mut runner = FfmpegRunner::new(&self.ffmpeg_path).with_cancel(cancel);
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }

        let start = std::time::Instant::now();
        runner.run(&cmd).await?;

        let size = verify_output(output).await?;
        info!(
            output = %output.display(),
            size_mb = size as f64 / (1024.0 * 1024.0),
            duration_ms = start.elapsed().as_millis() as u64,
            "Concatenated parts"
        );

        Ok(TranscodeOutput {
            path: output.to_path_buf(),
            size,
        })
    }
}

/// Size of `output`, or a transcode failure if it is missing or empty.
pub async fn verify_output(output: &Path) -> MediaResult<u64> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        Ok(_) => {
            warn!(output = %output.display(), "FFmpeg reported success but output is empty");
            Err(MediaError::transcode_failed(
                "FFmpeg produced an empty output file",
                None,
                Some(0),
            ))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(output = %output.display(), "FFmpeg reported success but output is missing");
            Err(MediaError::transcode_failed(
                "FFmpeg produced no output file",
                None,
                Some(0),
            ))
        }
        Err(e) => Err(MediaError::workspace_io(
            format!("cannot stat output {}", output.display()),
            e,
        )),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Stand-in for ffmpeg: the output path is always the last argument.
    fn fake_ffmpeg(dir: &Path, body: &str) -> MediaConfig {
        let script = dir.join("fake-ffmpeg.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        MediaConfig {
            ffmpeg_path: script,
            transcode_timeout: None,
            ..MediaConfig::default()
        }
    }

    fn never_cancel() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn test_success_with_output() {
        let dir = TempDir::new().unwrap();
        let config = fake_ffmpeg(
            dir.path(),
            r#"for last; do :; done; printf 'merged' > "$last""#,
        );
        let output = dir.path().join(MERGED_FILE_NAME);

        let result = FfmpegConcat::new(&config)
            .concat(&dir.path().join("filelist.txt"), &output, never_cancel())
            .await
            .unwrap();

        assert_eq!(result.path, output);
        assert_eq!(result.size, 6);
    }

    #[tokio::test]
    async fn test_zero_byte_output_is_failure() {
        let dir = TempDir::new().unwrap();
        let config = fake_ffmpeg(dir.path(), r#"for last; do :; done; : > "$last""#);
        let output = dir.path().join(MERGED_FILE_NAME);

        let err = FfmpegConcat::new(&config)
            .concat(&dir.path().join("filelist.txt"), &output, never_cancel())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::TranscodeFailed { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_missing_output_is_failure() {
        let dir = TempDir::new().unwrap();
        let config = fake_ffmpeg(dir.path(), "exit 0");
        let output = dir.path().join(MERGED_FILE_NAME);

        let err = FfmpegConcat::new(&config)
            .concat(&dir.path().join("filelist.txt"), &output, never_cancel())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::TranscodeFailed { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr_excerpt() {
        let dir = TempDir::new().unwrap();
        let config = fake_ffmpeg(
            dir.path(),
            "echo 'filelist.txt: Invalid data found when processing input' >&2; exit 1",
        );

        let err = FfmpegConcat::new(&config)
            .concat(
                &dir.path().join("filelist.txt"),
                &dir.path().join(MERGED_FILE_NAME),
                never_cancel(),
            )
            .await
            .unwrap_err();

        match err {
            MediaError::TranscodeFailed {
                stderr, exit_code, ..
            } => {
                assert_eq!(exit_code, Some(1));
                assert!(stderr.unwrap().contains("Invalid data found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_kills_running_process() {
        let dir = TempDir::new().unwrap();
        let config = fake_ffmpeg(dir.path(), "sleep 30");
        let (tx, rx) = watch::channel(false);

        let concat = FfmpegConcat::new(&config);
        let manifest = dir.path().join("filelist.txt");
        let output = dir.path().join(MERGED_FILE_NAME);
        let task = tokio::spawn(async move { concat.concat(&manifest, &output, rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("cancelled process should exit promptly")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, MediaError::Cancelled), "{err}");
    }

    #[tokio::test]
    async fn test_timeout_kills_running_process() {
        let dir = TempDir::new().unwrap();
        let mut config = fake_ffmpeg(dir.path(), "sleep 30");
        config.transcode_timeout = Some(Duration::from_secs(1));

        let err = tokio::time::timeout(
            Duration::from_secs(10),
            FfmpegConcat::new(&config).concat(
                &dir.path().join("filelist.txt"),
                &dir.path().join(MERGED_FILE_NAME),
                never_cancel(),
            ),
        )
        .await
        .expect("timed out process should exit promptly")
        .unwrap_err();
        assert!(matches!(err, MediaError::Timeout(1)), "{err}");
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let config = MediaConfig {
            ffmpeg_path: PathBuf::from("/definitely/not/here/ffmpeg"),
            ..MediaConfig::default()
        };
        let dir = TempDir::new().unwrap();
        let err = FfmpegConcat::new(&config)
            .concat(
                &dir.path().join("filelist.txt"),
                &dir.path().join(MERGED_FILE_NAME),
                never_cancel(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FfmpegNotFound), "{err}");
    }
}
