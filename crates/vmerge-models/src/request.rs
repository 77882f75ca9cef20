//! Request bodies accepted by the HTTP surface.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::media::MediaMode;

/// Default upper bound on sources per merge request.
pub const DEFAULT_MAX_MERGE_SOURCES: usize = 16;

/// Single-source download request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    /// Source URL
    pub url: String,
    /// `"video"` or `"audio"`; anything else (or missing) means video
    #[serde(default)]
    pub file_type: MediaMode,
}

impl DownloadRequest {
    /// Validate the request.
    pub fn validate(&self) -> Result<(), String> {
        validate_source_url(&self.url)
    }
}

/// Merge request. URL order defines the concatenation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub urls: Vec<String>,
}

impl MergeRequest {
    /// Validate the request against the configured source limit.
    pub fn validate(&self, max_sources: usize) -> Result<(), String> {
        if self.urls.is_empty() {
            return Err("At least one URL is required".to_string());
        }

        if self.urls.len() > max_sources {
            return Err(format!(
                "Too many URLs: {} given, at most {} allowed",
                self.urls.len(),
                max_sources
            ));
        }

        for (index, url) in self.urls.iter().enumerate() {
            validate_source_url(url).map_err(|e| format!("URL #{}: {}", index + 1, e))?;
        }

        Ok(())
    }
}

/// Check that a source URL is well-formed http(s).
fn validate_source_url(url: &str) -> Result<(), String> {
    let url = url.trim();
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }

    let parsed = Url::parse(url).map_err(|e| format!("Invalid URL format: {}", e))?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(format!(
                "Invalid protocol '{}'. Only HTTP and HTTPS are allowed.",
                scheme
            ))
        }
    }

    if parsed.host_str().is_none() {
        return Err("URL must have a valid host".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_request_defaults_to_video() {
        let req: DownloadRequest =
            serde_json::from_str(r#"{"url":"https://youtu.be/abc"}"#).unwrap();
        assert_eq!(req.file_type, MediaMode::VideoAndAudio);

        let req: DownloadRequest =
            serde_json::from_str(r#"{"url":"https://youtu.be/abc","fileType":"audio"}"#).unwrap();
        assert_eq!(req.file_type, MediaMode::AudioOnly);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_download_request_rejects_bad_urls() {
        for url in ["", "   ", "not a url", "ftp://example.com/a.mp4", "file:///etc/passwd"] {
            let req = DownloadRequest {
                url: url.to_string(),
                file_type: MediaMode::VideoAndAudio,
            };
            assert!(req.validate().is_err(), "{url:?} should be rejected");
        }
    }

    #[test]
    fn test_merge_request_bounds() {
        let empty = MergeRequest { urls: vec![] };
        assert!(empty.validate(DEFAULT_MAX_MERGE_SOURCES).is_err());

        let two = MergeRequest {
            urls: vec![
                "https://example.com/a.mp4".to_string(),
                "https://example.com/b.mp4".to_string(),
            ],
        };
        assert!(two.validate(2).is_ok());
        assert!(two.validate(1).is_err());
    }

    #[test]
    fn test_merge_request_names_offending_url() {
        let req = MergeRequest {
            urls: vec!["https://example.com/a.mp4".to_string(), "nope".to_string()],
        };
        let err = req.validate(DEFAULT_MAX_MERGE_SOURCES).unwrap_err();
        assert!(err.starts_with("URL #2"), "{err}");
    }
}
