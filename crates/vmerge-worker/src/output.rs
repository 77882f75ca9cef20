//! Delivery of a merged file.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use vmerge_media::{Workspace, MERGED_FILE_NAME};
use vmerge_models::{JobId, JobState};

use crate::error::MergeError;
use crate::job::MergeJob;

/// A finished merge waiting to be streamed to the caller.
///
/// Owns the job workspace; it is destroyed once the stream reaches its end
/// and removed by `Drop` if the stream is abandoned.
#[derive(Debug)]
pub struct MergedOutput {
    job: MergeJob,
    workspace: Workspace,
    file: File,
    len: u64,
}

impl MergedOutput {
    pub(crate) fn new(job: MergeJob, workspace: Workspace, file: File, len: u64) -> Self {
        Self {
            job,
            workspace,
            file,
            len,
        }
    }

    pub fn job_id(&self) -> &JobId {
        self.job.id()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Attachment file name.
    pub fn filename(&self) -> &'static str {
        MERGED_FILE_NAME
    }

    pub fn content_type(&self) -> &'static str {
        "video/mp4"
    }

    /// Byte stream of the merged file. Cleanup runs after the last chunk.
    pub fn into_stream(self) -> BoxStream<'static, std::io::Result<Bytes>> {
        let delivery = Delivery {
            reader: ReaderStream::new(self.file),
            job: self.job,
            workspace: self.workspace,
            expected: self.len,
            sent: 0,
            done: false,
        };

        stream::unfold(delivery, |mut d| async move {
            if d.done {
                return None;
            }
            match d.reader.next().await {
                Some(Ok(chunk)) => {
                    d.sent += chunk.len() as u64;
                    Some((Ok(chunk), d))
                }
                Some(Err(e)) => {
                    d.done = true;
                    let err =
                        MergeError::delivery(format!("read failed after {} bytes: {}", d.sent, e));
                    d.job.fail(&err);
                    d.workspace.destroy().await;
                    Some((Err(e), d))
                }
                None => {
                    d.done = true;
                    if d.sent == d.expected {
                        d.job.complete(d.sent);
                    } else {
                        d.job.fail(&MergeError::delivery(format!(
                            "sent {} of {} bytes",
                            d.sent, d.expected
                        )));
                    }
                    d.workspace.destroy().await;
                    None
                }
            }
        })
        .boxed()
    }
}

struct Delivery {
    reader: ReaderStream<File>,
    job: MergeJob,
    workspace: Workspace,
    expected: u64,
    sent: u64,
    done: bool,
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.done || self.job.state() != JobState::Streaming {
            return;
        }
        self.job.fail(&MergeError::delivery(format!(
            "stream dropped after {} of {} bytes",
            self.sent, self.expected
        )));
    }
}
