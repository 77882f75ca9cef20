//! API error types.
//!
//! Errors render as short plain-text bodies. Internal paths and process
//! diagnostics stay in the logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;

use vmerge_media::MediaError;
use vmerge_worker::{MergeError, MergeErrorKind};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<MergeError> for ApiError {
    fn from(err: MergeError) -> Self {
        let message = err.public_message();
        match err.kind() {
            MergeErrorKind::InvalidRequest => ApiError::BadRequest(message),
            MergeErrorKind::SourceUnavailable | MergeErrorKind::StreamInterrupted => {
                ApiError::BadGateway(message)
            }
            MergeErrorKind::WorkspaceIo
            | MergeErrorKind::TranscodeFailure
            | MergeErrorKind::DeliveryError => ApiError::Internal(message),
            MergeErrorKind::Cancelled => ApiError::Unavailable(message),
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        warn!(error = %err, stderr = ?err.stderr_excerpt(), "Download failed");
        match err {
            MediaError::SourceUnavailable { .. } => {
                ApiError::BadGateway("Source could not be downloaded".to_string())
            }
            MediaError::StreamInterrupted { .. } | MediaError::Timeout(_) => {
                ApiError::BadGateway("Source stopped before it was fully downloaded".to_string())
            }
            MediaError::Cancelled => {
                ApiError::Unavailable("Download cancelled, server is shutting down".to_string())
            }
            _ => ApiError::Internal("Download failed".to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
