//! Single-source download.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use tracing::info;

use vmerge_models::DownloadRequest;

use crate::error::{ApiError, ApiResult};
use crate::handlers::attachment;
use crate::metrics;
use crate::security::validate_source_url;
use crate::state::AppState;

/// Stream one source straight to the caller.
///
/// The first chunk is pulled before any header goes out, so a source that
/// cannot be opened still gets a proper error status.
pub async fn download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> ApiResult<Response> {
    request.validate().map_err(ApiError::bad_request)?;
    let url = validate_source_url(&request.url, state.config.allow_private_urls)
        .into_result()
        .map_err(ApiError::bad_request)?;
    let mode = request.file_type;

    info!(url = %url, mode = %mode, "Download requested");

    let stream = state.fetcher.open(&url, mode).await?.prime().await?;

    metrics::record_download_served(mode.as_str());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mode.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            attachment(&mode.download_filename()),
        )
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
