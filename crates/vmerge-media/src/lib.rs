//! Media plumbing for the merge pipeline.
//!
//! This crate provides:
//! - Source fetchers (yt-dlp, direct HTTP) exposed as sequential byte streams
//! - Job-scoped scratch workspaces with guaranteed cleanup
//! - Concat manifests in the FFmpeg concat demuxer format
//! - An FFmpeg runner with bounded stderr capture, timeout and cancellation

pub mod command;
pub mod config;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod transcode;
pub mod workspace;

pub use command::{FfmpegCommand, FfmpegRunner, StderrTail};
pub use config::MediaConfig;
pub use error::{MediaError, MediaResult};
pub use fetch::{
    is_direct_media_url, is_internal_host, is_supported_url, HttpFetcher, SourceFetcher,
    SourceRouter, SourceStream, YtDlpFetcher,
};
pub use manifest::{Manifest, MANIFEST_FILE_NAME};
pub use transcode::{FfmpegConcat, TranscodeOutput, TranscodeResult, Transcoder, MERGED_FILE_NAME};
pub use workspace::Workspace;
