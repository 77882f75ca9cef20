//! Merge pipeline metrics.

use metrics::{counter, histogram};

pub mod names {
    pub const MERGE_JOBS_STARTED_TOTAL: &str = "vmerge_merge_jobs_started_total";
    pub const MERGE_JOBS_COMPLETED_TOTAL: &str = "vmerge_merge_jobs_completed_total";
    pub const MERGE_JOBS_FAILED_TOTAL: &str = "vmerge_merge_jobs_failed_total";
    pub const FETCH_DURATION_SECONDS: &str = "vmerge_fetch_duration_seconds";
    pub const FFMPEG_DURATION_SECONDS: &str = "vmerge_ffmpeg_duration_seconds";
    pub const MERGED_BYTES_TOTAL: &str = "vmerge_merged_bytes_total";
}

pub fn record_job_started(sources: usize) {
    counter!(names::MERGE_JOBS_STARTED_TOTAL).increment(1);
    histogram!("vmerge_merge_sources").record(sources as f64);
}

pub fn record_job_completed(bytes: u64) {
    counter!(names::MERGE_JOBS_COMPLETED_TOTAL).increment(1);
    counter!(names::MERGED_BYTES_TOTAL).increment(bytes);
}

pub fn record_job_failed(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::MERGE_JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_fetch_duration(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    histogram!(names::FETCH_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_ffmpeg_duration(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    histogram!(names::FFMPEG_DURATION_SECONDS, &labels).record(duration_secs);
}
