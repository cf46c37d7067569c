mod collector;
mod config;
mod deadline;
mod error;
mod metrics;
mod runner;
mod selector;
mod server;
mod speedtest;
mod traits;
mod types;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use collector::Collector;
use config::Config;
use metrics::MetricEmitter;
use server::HttpState;
use speedtest::SpeedtestClient;
use types::SelectionPolicy;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const DEFAULT_LOG_LEVEL: &str = "info";

/// `RUST_LOG` when set and valid, `info` otherwise.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(log_filter())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    config.validate()?;
    let addr = config.listen_addr()?;
    let policy = config.selection_policy();
    if config.server_fallback && policy == SelectionPolicy::Closest {
        warn!("--server_fallback has no effect without --server_id");
    }

    let client = Arc::new(SpeedtestClient::new()?);
    let collector = Arc::new(Collector::new(client.clone(), client, policy));
    info!(policy = %collector.policy(), timeout = ?config.timeout, "collector ready");

    let shutdown = CancellationToken::new();
    let state = HttpState::new(
        collector,
        Arc::new(MetricEmitter::new()),
        config.timeout,
        shutdown.clone(),
        &config.metrics_path,
        &config.health_check_url,
    );
    let router = server::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server is starting on {}", addr);

    let server_token = shutdown.clone();
    let serve = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_token.cancelled().await })
            .await
    });

    tokio::signal::ctrl_c().await?;
    info!("Received exit signal");
    shutdown.cancel();

    match tokio::time::timeout(SHUTDOWN_GRACE, serve).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "HTTP server failed"),
        Ok(Err(e)) => error!(error = %e, "HTTP server task panicked"),
        Err(_) => warn!("shutdown grace period elapsed, exiting"),
    }

    Ok(())
}
