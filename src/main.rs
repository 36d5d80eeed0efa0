// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Media Intake Gateway Service
//!
//! Validates, rate-limits and sanitizes download requests before handing
//! them to the extraction backend.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (a `.env` file is
//! read when present):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `BACKEND_URL`: Extraction backend base URL (default: http://localhost:8000)
//! - `BACKEND_TIMEOUT_SECS`: Extract call timeout (default: 35)
//! - `RATE_LIMIT_MAX_REQUESTS`: Requests per client per window (default: 10)
//! - `RATE_LIMIT_WINDOW_MS`: Window length (default: 60000)
//! - `RATE_LIMIT_FILE`: State file, empty to disable (default: data/rate-limits.json)
//! - `RATE_LIMIT_SAVE_DEBOUNCE_MS`: Minimum spacing of state writes (default: 5000)
//! - `RATE_LIMIT_CLEANUP_SECS`: Expired-entry sweep interval (default: 60)
//! - `MAX_BODY_BYTES`: Request body limit (default: 10240)
//! - `ALLOWED_ORIGINS`: Comma-separated CORS origins
//! - `METRICS_ENABLED`: Serve Prometheus metrics (default: true)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use media_intake_gateway::{
    backend::ExtractionBackend,
    config::Config,
    gatekeeper::Gatekeeper,
    handlers::{router, AppState},
    metrics::Metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        backend_url = %config.backend.base_url,
        max_requests = config.rate_limit.max_requests,
        window_ms = config.rate_limit.window_ms,
        state_file = ?config.rate_limit.persist_path,
        "Starting media intake gateway"
    );

    // Create application state
    let gatekeeper = Gatekeeper::from_config(config.rate_limit.clone()).await;
    let limiter = Arc::clone(gatekeeper.limiter());
    let maintenance = limiter.spawn_maintenance();

    let backend = ExtractionBackend::new(&config.backend)?;
    let metrics = Metrics::new()?;
    metrics.set_persistent(limiter.is_persistent());

    let state = Arc::new(AppState {
        gatekeeper,
        backend,
        metrics,
        config: config.clone(),
    });

    let app = router(state);

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Final flush so nothing admitted since the last debounced write is lost.
    maintenance.shutdown().await;
    limiter.flush().await;
    info!(
        state_writes = ?limiter.state_writes(),
        "Rate limiter state flushed, shutting down"
    );

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
