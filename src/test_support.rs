//! Deterministic collaborators for tests.

use crate::deadline::Deadline;
use crate::error::{ExporterError, Result};
use crate::traits::{CandidateSource, SpeedProbe};
use crate::types::{Candidate, Identity, Stage};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Canned response with an optional delay before it is returned.
#[derive(Debug, Clone)]
pub struct Step<T> {
    delay: Duration,
    result: std::result::Result<T, String>,
}

impl<T: Clone> Step<T> {
    pub fn ok(value: T) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(value),
        }
    }

    pub fn fail(reason: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(reason.to_string()),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn resolve(&self) -> Result<T> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone().map_err(ExporterError::Custom)
    }
}

pub fn identity(ip: &str) -> Identity {
    Identity {
        ip: ip.to_string(),
        isp: "Example ISP".to_string(),
        lat: "51.5072".to_string(),
        lon: "-0.1276".to_string(),
        latitude: 51.5072,
        longitude: -0.1276,
    }
}

pub fn server(id: &str, name: &str, distance_km: f64) -> Candidate {
    Candidate {
        id: id.to_string(),
        name: name.to_string(),
        country: "United Kingdom".to_string(),
        lat: "51.5".to_string(),
        lon: "-0.12".to_string(),
        latitude: 51.5,
        longitude: -0.12,
        distance_km,
        url: format!("http://{id}.example.net:8080/speedtest/upload.php"),
    }
}

pub struct StubSource {
    identity: Step<Identity>,
    candidates: Step<Vec<Candidate>>,
}

impl StubSource {
    pub fn new(identity: Step<Identity>, candidates: Step<Vec<Candidate>>) -> Self {
        Self {
            identity,
            candidates,
        }
    }
}

#[async_trait]
impl CandidateSource for StubSource {
    async fn fetch_identity(&self, _deadline: &Deadline) -> Result<Identity> {
        self.identity.resolve().await
    }

    async fn fetch_candidates(
        &self,
        _identity: &Identity,
        _deadline: &Deadline,
    ) -> Result<Vec<Candidate>> {
        self.candidates.resolve().await
    }
}

pub struct StubProbe {
    latency: Step<Duration>,
    download: Step<f64>,
    upload: Step<f64>,
    cancel_after_latency: Option<CancellationToken>,
    calls: Mutex<Vec<Stage>>,
}

impl StubProbe {
    pub fn new(latency: Step<Duration>, download: Step<f64>, upload: Step<f64>) -> Self {
        Self {
            latency,
            download,
            upload,
            cancel_after_latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Cancel `token` as soon as the latency step returns.
    pub fn cancel_after_latency(mut self, token: CancellationToken) -> Self {
        self.cancel_after_latency = Some(token);
        self
    }

    pub fn calls(&self) -> Vec<Stage> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, stage: Stage) {
        self.calls.lock().unwrap().push(stage);
    }
}

#[async_trait]
impl SpeedProbe for StubProbe {
    async fn latency(&self, _server: &Candidate, _deadline: &Deadline) -> Result<Duration> {
        self.record(Stage::Latency);
        let res = self.latency.resolve().await;
        if let Some(token) = &self.cancel_after_latency {
            token.cancel();
        }
        res
    }

    async fn download(&self, _server: &Candidate, _deadline: &Deadline) -> Result<f64> {
        self.record(Stage::Download);
        self.download.resolve().await
    }

    async fn upload(&self, _server: &Candidate, _deadline: &Deadline) -> Result<f64> {
        self.record(Stage::Upload);
        self.upload.resolve().await
    }
}
