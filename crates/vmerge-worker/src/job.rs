//! Merge job bookkeeping.

use std::time::Instant;

use vmerge_models::{JobId, JobState};

use crate::error::MergeError;
use crate::logging::JobLogger;
use crate::metrics;

/// One merge request in flight: ordered sources, id and lifecycle state.
#[derive(Debug)]
pub struct MergeJob {
    id: JobId,
    urls: Vec<String>,
    state: JobState,
    logger: JobLogger,
    started: Instant,
}

impl MergeJob {
    pub fn new(urls: Vec<String>) -> Self {
        let id = JobId::new();
        let logger = JobLogger::new(&id, "merge");
        Self {
            id,
            urls,
            state: JobState::Created,
            logger,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Move to `next`. Illegal transitions are logged and ignored.
    pub fn transition(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            self.logger.log_warning(&format!(
                "ignored illegal transition {} -> {}",
                self.state, next
            ));
            return false;
        }
        self.logger.log_transition(self.state, next);
        self.state = next;
        true
    }

    /// Mark the job failed and record why.
    pub fn fail(&mut self, err: &MergeError) {
        if !self.transition(JobState::Failed) {
            return;
        }
        match err.stderr_excerpt() {
            Some(stderr) => self.logger.log_error(&format!("{} | stderr: {}", err, stderr)),
            None => self.logger.log_error(&err.to_string()),
        }
        metrics::record_job_failed(err.kind().as_str());
    }

    /// Mark the job done after the output was fully delivered.
    pub fn complete(&mut self, bytes: u64) {
        if !self.transition(JobState::Done) {
            return;
        }
        self.logger.log_completion(&format!(
            "delivered {} bytes from {} sources in {:.1}s",
            bytes,
            self.urls.len(),
            self.elapsed_secs()
        ));
        metrics::record_job_completed(bytes);
    }
}
