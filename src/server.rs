//! HTTP boundary: landing page, liveness probe and the metrics endpoint.
//!
//! A scrape runs a full benchmark synchronously. At most one collection is
//! admitted at a time; concurrent scrapes are turned away with 503.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use reqwest::Client;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::collector::Collector;
use crate::deadline::Deadline;
use crate::metrics::{MetricEmitter, CONTENT_TYPE};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_IN_FLIGHT: usize = 1;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub collector: Arc<Collector>,
    pub emitter: Arc<MetricEmitter>,
    /// Deadline for one collection.
    pub timeout: Duration,
    /// Cancelled on shutdown; every collection runs on a child token.
    pub shutdown: CancellationToken,
    pub metrics_path: String,
    pub health_check_url: String,
    admission: Arc<Semaphore>,
    health_client: Client,
}

impl HttpState {
    pub fn new(
        collector: Arc<Collector>,
        emitter: Arc<MetricEmitter>,
        timeout: Duration,
        shutdown: CancellationToken,
        metrics_path: &str,
        health_check_url: &str,
    ) -> Self {
        Self {
            collector,
            emitter,
            timeout,
            shutdown,
            metrics_path: metrics_path.to_string(),
            health_check_url: health_check_url.to_string(),
            admission: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
            health_client: Client::new(),
        }
    }
}

/// Create the HTTP router.
pub fn create_router(state: HttpState) -> Router {
    let metrics_path = state.metrics_path.clone();
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route(&metrics_path, get(metrics_handler))
        .with_state(Arc::new(state))
}

async fn index_handler(State(state): State<Arc<HttpState>>) -> Html<String> {
    Html(format!(
        r#"<html>
<head><title>Speedtest Exporter</title></head>
<body>
<h1>Speedtest Exporter</h1>
<p>Metrics page will take approx 40 seconds to load and show results,
as the exporter carries out a speedtest when scraped.</p>
<p><a href='{path}'>Metrics</a></p>
<p><a href='/health'>Health</a></p>
</body>
</html>"#,
        path = state.metrics_path
    ))
}

/// Handler for `/health` - outbound connectivity only, never benchmark state.
async fn health_handler(State(state): State<Arc<HttpState>>) -> Response {
    let probe = state
        .health_client
        .get(&state.health_check_url)
        .timeout(HEALTH_TIMEOUT)
        .send()
        .await;

    match probe {
        Ok(_) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            warn!(error = %e, "health check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "No Internet Connection").into_response()
        }
    }
}

/// Handler for the metrics path - runs one collection and renders it.
async fn metrics_handler(State(state): State<Arc<HttpState>>) -> Response {
    let Ok(_permit) = state.admission.try_acquire() else {
        warn!("rejecting scrape, a collection is already in flight");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Limit of concurrent requests reached, try again later.",
        )
            .into_response();
    };

    let deadline = Deadline::after(state.timeout, state.shutdown.child_token());
    let outcome = state.collector.collect(&deadline).await;

    match state.emitter.render(&outcome) {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}
