use super::{resource_url, SpeedtestClient};
use crate::deadline::Deadline;
use crate::error::{ExporterError, Result};
use crate::traits::SpeedProbe;
use crate::types::Candidate;
use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Url;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Round trips used for the latency estimate; the fastest one wins.
const PING_SAMPLES: usize = 5;

/// Side lengths of the `random{N}x{N}.jpg` images fetched in parallel.
const DOWNLOAD_SIZES: &[u32] = &[750, 1000, 1500, 2000];

/// Payload sizes (bytes) posted in parallel to the upload endpoint.
const UPLOAD_SIZES: &[usize] = &[262_144, 524_288, 1_048_576, 1_048_576];

#[async_trait]
impl SpeedProbe for SpeedtestClient {
    async fn latency(&self, server: &Candidate, deadline: &Deadline) -> Result<Duration> {
        let url = resource_url(server, "latency.txt")
            .map_err(|e| ExporterError::LatencyFailed(e.to_string()))?;

        let mut best: Option<Duration> = None;
        for _ in 0..PING_SAMPLES {
            let start = Instant::now();
            self.http
                .get(url.clone())
                .timeout(deadline.remaining())
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            let rtt = start.elapsed();
            best = Some(best.map_or(rtt, |b| b.min(rtt)));
        }

        let best = best.ok_or_else(|| ExporterError::LatencyFailed("no samples".to_string()))?;
        debug!(server_id = %server.id, latency = ?best, "latency test done");
        Ok(best)
    }

    async fn download(&self, server: &Candidate, deadline: &Deadline) -> Result<f64> {
        let urls = DOWNLOAD_SIZES
            .iter()
            .map(|size| resource_url(server, &format!("random{size}x{size}.jpg")))
            .collect::<Result<Vec<Url>>>()
            .map_err(|e| ExporterError::DownloadFailed(e.to_string()))?;

        let start = Instant::now();
        let received =
            try_join_all(urls.into_iter().map(|url| self.fetch_len(url, deadline))).await?;
        let total: usize = received.iter().sum();

        throughput(total, start.elapsed())
            .ok_or_else(|| ExporterError::DownloadFailed("no data received".to_string()))
    }

    async fn upload(&self, server: &Candidate, deadline: &Deadline) -> Result<f64> {
        let url = Url::parse(&server.url)
            .map_err(|e| ExporterError::UploadFailed(format!("invalid server URL: {e}")))?;

        let start = Instant::now();
        let sent = try_join_all(
            UPLOAD_SIZES
                .iter()
                .map(|&size| self.post_payload(url.clone(), size, deadline)),
        )
        .await?;
        let total: usize = sent.iter().sum();

        throughput(total, start.elapsed())
            .ok_or_else(|| ExporterError::UploadFailed("no data sent".to_string()))
    }
}

impl SpeedtestClient {
    async fn fetch_len(&self, url: Url, deadline: &Deadline) -> Result<usize> {
        let body = self
            .http
            .get(url)
            .timeout(deadline.remaining())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(body.len())
    }

    async fn post_payload(&self, url: Url, size: usize, deadline: &Deadline) -> Result<usize> {
        let body = payload(size);
        let len = body.len();
        self.http
            .post(url)
            .timeout(deadline.remaining())
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(len)
    }
}

/// Form body of exactly `size` bytes, as the upload endpoint expects.
fn payload(size: usize) -> Vec<u8> {
    let mut body = b"content1=".to_vec();
    body.resize(size.max(body.len()), b'A');
    body
}

fn throughput(bytes: usize, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    (bytes > 0 && secs > 0.0).then(|| bytes as f64 / secs)
}
