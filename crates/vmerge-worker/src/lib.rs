//! Merge job orchestration.
//!
//! This crate provides:
//! - The merge orchestrator (concurrent fetch, manifest, concat)
//! - Streaming delivery of the merged file with workspace cleanup
//! - Job lifecycle logging and metrics

pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod output;

pub use config::MergeConfig;
pub use error::{MergeError, MergeErrorKind, MergeResult};
pub use job::MergeJob;
pub use logging::JobLogger;
pub use orchestrator::MergeOrchestrator;
pub use output::MergedOutput;
