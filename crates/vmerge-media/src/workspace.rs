//! Job-scoped scratch workspaces.
//!
//! A [`Workspace`] owns one uniquely named directory for the lifetime of a
//! single job. Every path it hands out lies inside that directory, and the
//! directory is removed exactly once: by [`Workspace::destroy`], or by `Drop`
//! if the owner was torn down early (task abort, client disconnect).
//!
//! Removal is retried a few times: an aborted fetch may still have a file
//! creation queued on the blocking pool, which can land between
//! `remove_dir_all` emptying the directory and removing it.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{MediaError, MediaResult};

/// Directory name prefix for job workspaces.
pub const WORKSPACE_PREFIX: &str = "merge-";

const REMOVE_ATTEMPTS: u32 = 5;
const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Scratch directory exclusively owned by one job.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    allocated: BTreeSet<PathBuf>,
    destroyed: bool,
}

impl Workspace {
    /// Create a fresh workspace directory under `root`.
    ///
    /// `root` is created if missing. Fails if the job directory cannot be
    /// created (permissions, disk exhaustion, name collision).
    pub async fn create(root: impl AsRef<Path>) -> MediaResult<Self> {
        let root = root.as_ref();

        tokio::fs::create_dir_all(root).await.map_err(|e| {
            MediaError::workspace_io(format!("cannot create scratch root {}", root.display()), e)
        })?;

        let dir = root.join(format!("{}{}", WORKSPACE_PREFIX, Uuid::new_v4()));
        tokio::fs::create_dir(&dir).await.map_err(|e| {
            MediaError::workspace_io(format!("cannot create workspace {}", dir.display()), e)
        })?;

        // The concat demuxer resolves relative entries against the manifest's
        // own directory, so everything handed out must be absolute.
        let dir = match tokio::fs::canonicalize(&dir).await {
            Ok(dir) => dir,
            Err(e) => {
                let _ = tokio::fs::remove_dir(&dir).await;
                return Err(MediaError::workspace_io(
                    format!("cannot resolve workspace {}", dir.display()),
                    e,
                ));
            }
        };

        debug!(workspace = %dir.display(), "Created workspace");

        Ok(Self {
            dir,
            allocated: BTreeSet::new(),
            destroyed: false,
        })
    }

    /// Workspace directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Reserve `name` inside the workspace. The file itself is not created.
    pub fn allocate_path(&mut self, name: &str) -> MediaResult<PathBuf> {
        if self.destroyed {
            return Err(MediaError::InvalidPath(format!(
                "workspace {} already destroyed",
                self.dir.display()
            )));
        }

        if !is_plain_file_name(name) {
            return Err(MediaError::InvalidPath(name.to_string()));
        }

        let path = self.dir.join(name);
        self.allocated.insert(path.clone());
        Ok(path)
    }

    /// Paths handed out so far, in lexical order.
    pub fn allocated(&self) -> impl Iterator<Item = &Path> {
        self.allocated.iter().map(PathBuf::as_path)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Recursively remove the workspace directory.
    ///
    /// Idempotent and infallible from the caller's point of view: missing
    /// files or an already-removed directory are fine, anything else is
    /// logged and swallowed.
    pub async fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        let mut attempt = 1;
        loop {
            match tokio::fs::remove_dir_all(&self.dir).await {
                Ok(()) => {
                    info!(workspace = %self.dir.display(), "Cleaned up workspace");
                    return;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(workspace = %self.dir.display(), "Workspace already removed");
                    return;
                }
                Err(e) if attempt < REMOVE_ATTEMPTS => {
                    debug!(
                        workspace = %self.dir.display(),
                        attempt,
                        error = %e,
                        "Retrying workspace cleanup"
                    );
                    attempt += 1;
                    tokio::time::sleep(REMOVE_RETRY_DELAY).await;
                }
                Err(e) => {
                    warn!(
                        workspace = %self.dir.display(),
                        error = %e,
                        "Failed to clean up workspace"
                    );
                    return;
                }
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        let dir = std::mem::take(&mut self.dir);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_abandoned(&dir));
            }
            Err(_) => remove_abandoned(&dir),
        }
    }
}

/// Blocking removal of a workspace whose owner went away.
fn remove_abandoned(dir: &Path) {
    for attempt in 1..=REMOVE_ATTEMPTS {
        match std::fs::remove_dir_all(dir) {
            Ok(()) => {
                info!(workspace = %dir.display(), "Cleaned up abandoned workspace");
                return;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => return,
            Err(e) if attempt < REMOVE_ATTEMPTS => {
                debug!(
                    workspace = %dir.display(),
                    attempt,
                    error = %e,
                    "Retrying workspace cleanup"
                );
                std::thread::sleep(REMOVE_RETRY_DELAY);
            }
            Err(e) => {
                warn!(
                    workspace = %dir.display(),
                    error = %e,
                    "Failed to clean up abandoned workspace"
                );
            }
        }
    }
}

/// A single normal path component, spelled exactly as given.
fn is_plain_file_name(name: &str) -> bool {
    if name.contains(['\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(only)), None) => only == name,
        _ => false,
    }
}
