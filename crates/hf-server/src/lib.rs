//! hf-server: HTTP listing API, source watcher and thumbnail service.
//!
//! This crate ties the other hf-* crates together into a running server:
//!
//! - Axum-based HTTP API listing packages, with static serving of the
//!   output root under `/videos`
//! - File system watcher that submits settled source files to the scheduler
//! - Thumbnail service that fills in `thumbnail.jpg` per package
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod packages;
pub mod router;
pub mod routes;
pub mod thumbnails;
pub mod watcher;

use std::net::SocketAddr;

use hf_core::config::Config;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Start the hlsforge server.
///
/// Builds the [`AppContext`], then runs the scheduler, watcher, startup
/// thumbnail scan and HTTP server until a shutdown signal arrives. Running
/// jobs are allowed to finish before this returns.
pub async fn start(config: Config) -> hf_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let output_root = config.packaging.output_root.clone();
    if !output_root.exists() {
        std::fs::create_dir_all(&output_root)?;
        tracing::info!("Created output directory {}", output_root.display());
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| hf_core::Error::Validation(format!("Invalid server address: {e}")))?;

    let cancel = CancellationToken::new();
    let (ctx, scheduler_handle) = AppContext::build(config, cancel.clone())?;

    let watcher_ctx = ctx.clone();
    let watcher_cancel = cancel.clone();
    let watcher_handle = tokio::spawn(async move {
        watcher::run_watcher(watcher_ctx, watcher_cancel).await;
    });

    let thumbnails = ctx.thumbnails.clone();
    let scan_root = output_root.clone();
    tokio::spawn(async move {
        thumbnails.scan_missing(&scan_root).await;
    });

    let app = router::build_router(ctx);

    tracing::info!("Starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| hf_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    let shutdown_cancel = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_cancel))
        .await;
    if let Err(e) = served {
        tracing::error!("Server error: {e}");
    }

    // Signal all background tasks to stop.
    cancel.cancel();

    tracing::info!("Waiting for running jobs to finish");
    let _ = tokio::join!(scheduler_handle, watcher_handle);

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
