//! Request handlers.

pub mod download;
pub mod health;
pub mod merge;

pub use download::*;
pub use health::*;
pub use merge::*;

/// `Content-Disposition` value for a download named `filename`.
pub(crate) fn attachment(filename: &str) -> String {
    format!("attachment; filename=\"{}\"", filename)
}
