//! Shared data models for the vmerge service.
//!
//! This crate provides Serde-serializable types for:
//! - Media selection modes and their delivery formats
//! - Merge jobs, job states and fetched parts
//! - Download and merge request bodies

pub mod job;
pub mod media;
pub mod request;

// Re-export common types
pub use job::{FetchedPart, JobId, JobState, PartStatus};
pub use media::MediaMode;
pub use request::{DownloadRequest, MergeRequest, DEFAULT_MAX_MERGE_SOURCES};
