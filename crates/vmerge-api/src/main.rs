//! Axum API server binary.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vmerge_api::{create_router, metrics, ApiConfig, AppState};
use vmerge_media::MediaConfig;
use vmerge_worker::MergeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing()?;

    // reqwest is built on rustls 0.23, which needs a process-wide provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting vmerge-api");

    let config = ApiConfig::from_env();
    let media = MediaConfig::from_env();
    let merge = MergeConfig::from_env(&media);
    info!(
        host = %config.host,
        production = config.is_production(),
        port = config.port,
        ffmpeg = %media.ffmpeg_path.display(),
        ytdlp = %media.ytdlp_path.display(),
        scratch_dir = %media.scratch_dir.display(),
        max_sources = merge.max_sources,
        "Loaded configuration"
    );

    if let Err(e) = media.check_ffmpeg() {
        warn!("{}; merges and audio downloads will fail", e);
    }
    if let Err(e) = media.check_ytdlp() {
        warn!("{}; platform downloads will fail", e);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = AppState::new(config.clone(), media, merge, shutdown_rx)
        .context("failed to create application state")?;

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("failed to install metrics recorder")?)
    } else {
        None
    };

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_tx))
    .await
    .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Colored output for dev, JSON with `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("vmerge_api=info,vmerge_worker=info,vmerge_media=info,tower_http=warn")
    });

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init()?;
    }
    Ok(())
}

/// Wait for Ctrl-C, then tell in-flight merges to stop.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal, cancelling in-flight jobs");
    let _ = shutdown_tx.send(true);
}
