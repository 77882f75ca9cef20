//! Multi-source merge.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use tracing::info;

use vmerge_models::MergeRequest;

use crate::error::{ApiError, ApiResult};
use crate::handlers::attachment;
use crate::security::validate_source_url;
use crate::state::AppState;

/// Merge the given sources, in order, into one mp4 and stream it back.
pub async fn merge_videos(
    State(state): State<AppState>,
    Json(request): Json<MergeRequest>,
) -> ApiResult<Response> {
    request
        .validate(state.orchestrator.config().max_sources)
        .map_err(ApiError::bad_request)?;

    let urls = request
        .urls
        .iter()
        .enumerate()
        .map(|(index, url)| {
            validate_source_url(url, state.config.allow_private_urls)
                .into_result()
                .map_err(|e| ApiError::bad_request(format!("URL #{}: {}", index + 1, e)))
        })
        .collect::<ApiResult<Vec<_>>>()?;

    info!(sources = urls.len(), "Merge requested");

    let output = state.orchestrator.run(urls, state.shutdown.clone()).await?;

    let len = output.len();
    let job_id = output.job_id().to_string();
    let disposition = attachment(output.filename());
    let content_type = output.content_type();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, len)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CACHE_CONTROL, "no-store")
        .header("X-Job-ID", job_id)
        .body(Body::from_stream(output.into_stream()))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
