//! Source URL screening.
//!
//! Request validation only checks that a URL is well-formed http(s). This
//! adds length limits and refuses URLs that target loopback, private or
//! metadata endpoints, since the server fetches them on the caller's behalf.

use tracing::warn;
use url::Url;

use vmerge_media::is_internal_host;

/// Maximum URL length.
const MAX_URL_LENGTH: usize = 2048;

/// Result of URL screening.
#[derive(Debug, PartialEq, Eq)]
pub enum UrlValidationResult {
    /// URL is acceptable; carries the trimmed URL.
    Valid(String),
    /// URL is malformed or uses an unsupported protocol.
    Invalid(String),
    /// URL targets an internal endpoint.
    Blocked(String),
    /// URL exceeds maximum length.
    TooLong,
}

impl UrlValidationResult {
    pub fn into_result(self) -> Result<String, String> {
        match self {
            Self::Valid(url) => Ok(url),
            Self::Invalid(msg) => Err(msg),
            Self::Blocked(reason) => Err(reason),
            Self::TooLong => Err(format!(
                "URL exceeds maximum length of {} characters",
                MAX_URL_LENGTH
            )),
        }
    }
}

/// Screen a source URL before the server fetches it.
pub fn validate_source_url(url: &str, allow_private: bool) -> UrlValidationResult {
    if url.len() > MAX_URL_LENGTH {
        return UrlValidationResult::TooLong;
    }

    let url = url.trim();
    if url.is_empty() {
        return UrlValidationResult::Invalid("URL cannot be empty".to_string());
    }

    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(e) => return UrlValidationResult::Invalid(format!("Invalid URL format: {}", e)),
    };

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return UrlValidationResult::Invalid(format!(
                "Invalid protocol '{}'. Only HTTP and HTTPS are allowed.",
                scheme
            ))
        }
    }

    if parsed.host_str().is_none() {
        return UrlValidationResult::Invalid("URL must have a valid host".to_string());
    }

    if !allow_private && is_internal_host(&parsed) {
        warn!(url = %url, "Blocked internal URL");
        return UrlValidationResult::Blocked(
            "URL appears to target an internal or restricted endpoint".to_string(),
        );
    }

    UrlValidationResult::Valid(url.to_string())
}
