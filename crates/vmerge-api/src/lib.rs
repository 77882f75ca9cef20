//! Axum HTTP API server.
//!
//! This crate provides:
//! - `POST /api/download`: one source streamed back as mp4 or mp3
//! - `POST /api/merge-videos`: several sources concatenated into one mp4
//! - Health, readiness and Prometheus endpoints
//! - Rate limiting, CORS and source URL screening

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
