//! Concat manifests in the FFmpeg concat demuxer format.
//!
//! One `file '<path>'` line per part. Inside single quotes a literal quote
//! is written as `'\''`.

use std::path::{Path, PathBuf};

use vmerge_models::FetchedPart;

use crate::error::{MediaError, MediaResult};

/// Manifest file name inside a job workspace.
pub const MANIFEST_FILE_NAME: &str = "filelist.txt";

/// Ordered list of part files to concatenate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<PathBuf>,
}

impl Manifest {
    /// Build a manifest from fetched parts.
    ///
    /// Parts are ordered by their input position. Fails unless every part
    /// is complete and positions form `0..n` with no gaps or duplicates.
    pub fn from_parts(parts: &[FetchedPart]) -> MediaResult<Self> {
        if parts.is_empty() {
            return Err(MediaError::InvalidManifest("no parts".to_string()));
        }

        let mut ordered: Vec<&FetchedPart> = parts.iter().collect();
        ordered.sort_by_key(|p| p.index);

        for (expected, part) in ordered.iter().enumerate() {
            if part.index != expected {
                return Err(MediaError::InvalidManifest(format!(
                    "expected part #{} but found #{}",
                    expected, part.index
                )));
            }
            if !part.is_complete() {
                return Err(MediaError::InvalidManifest(format!(
                    "part #{} is {:?}, not complete",
                    part.index, part.status
                )));
            }
        }

        Ok(Self {
            entries: ordered.into_iter().map(|p| p.path.clone()).collect(),
        })
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to the concat demuxer format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for path in &self.entries {
            out.push_str("file '");
            out.push_str(&escape_quoted(&path.to_string_lossy()));
            out.push_str("'\n");
        }
        out
    }

    /// Write the manifest to `path`.
    pub async fn write_to(&self, path: impl AsRef<Path>) -> MediaResult<()> {
        let path = path.as_ref();
        tokio::fs::write(path, self.render()).await.map_err(|e| {
            MediaError::workspace_io(format!("cannot write manifest {}", path.display()), e)
        })
    }

    /// Parse manifest text back into paths. Lines that are not `file` entries are ignored.
    pub fn parse(content: &str) -> Vec<PathBuf> {
        content
            .lines()
            .filter_map(|line| line.trim().strip_prefix("file "))
            .filter_map(|rest| {
                let rest = rest.trim();
                let inner = rest.strip_prefix('\'')?.strip_suffix('\'')?;
                Some(PathBuf::from(inner.replace("'\\''", "'")))
            })
            .collect()
    }
}

fn escape_quoted(s: &str) -> String {
    s.replace('\'', "'\\''")
}
