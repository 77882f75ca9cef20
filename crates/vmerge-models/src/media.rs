//! Media selection modes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which tracks a source fetch should produce.
///
/// Serialized as `"video"` / `"audio"` to match the request body's
/// `fileType` field. Anything that is not `"audio"` selects video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum MediaMode {
    /// Combined video and audio container.
    #[default]
    #[serde(rename = "video")]
    VideoAndAudio,
    /// Audio track only, delivered as mp3.
    #[serde(rename = "audio")]
    AudioOnly,
}

impl MediaMode {
    /// Parse the request-level `fileType` value.
    pub fn from_file_type(file_type: &str) -> Self {
        if file_type.trim().eq_ignore_ascii_case("audio") {
            MediaMode::AudioOnly
        } else {
            MediaMode::VideoAndAudio
        }
    }

    /// File extension of the delivered container.
    pub fn extension(&self) -> &'static str {
        match self {
            MediaMode::VideoAndAudio => "mp4",
            MediaMode::AudioOnly => "mp3",
        }
    }

    /// MIME type of the delivered container.
    pub fn content_type(&self) -> &'static str {
        match self {
            MediaMode::VideoAndAudio => "video/mp4",
            MediaMode::AudioOnly => "audio/mpeg",
        }
    }

    /// Attachment filename offered to the caller.
    pub fn download_filename(&self) -> String {
        format!("download.{}", self.extension())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaMode::VideoAndAudio => "video",
            MediaMode::AudioOnly => "audio",
        }
    }
}

impl<'de> Deserialize<'de> for MediaMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(MediaMode::from_file_type(&raw))
    }
}

impl fmt::Display for MediaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
