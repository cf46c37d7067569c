//! Prometheus exposition of a single collection.
//!
//! Metric definitions are built once at start-up and never mutated. Every
//! render registers them into a fresh `Registry`, so two scrapes never share
//! a gauge.

use crate::error::Result;
use crate::types::{BenchmarkOutcome, Measurement};
use prometheus::{GaugeVec, Opts, Registry, TextEncoder};

pub const NAMESPACE: &str = "speedtest";

/// Content type for the Prometheus text format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

const SCRAPE_LABELS: &[&str] = &["test_uuid"];

const RESULT_LABELS: &[&str] = &[
    "test_uuid",
    "user_lat",
    "user_lon",
    "user_ip",
    "user_isp",
    "server_lat",
    "server_lon",
    "server_id",
    "server_name",
    "server_country",
    "distance",
];

#[derive(Debug, Clone)]
pub struct MetricEmitter {
    up: Opts,
    scrape_duration: Opts,
    latency: Opts,
    download: Opts,
    upload: Opts,
}

impl MetricEmitter {
    pub fn new() -> Self {
        let opts = |name: &str, help: &str| Opts::new(name, help).namespace(NAMESPACE);

        Self {
            up: opts("up", "Was the last speedtest successful."),
            scrape_duration: opts("scrape_duration_seconds", "Time to perform last speed test"),
            latency: opts("latency_seconds", "Measured latency on last speed test"),
            download: opts("download_speed_Bps", "Last download speedtest result"),
            upload: opts("upload_speed_Bps", "Last upload speedtest result"),
        }
    }

    /// Encode one outcome in the text exposition format.
    ///
    /// Measurements that are absent produce no sample at all.
    pub fn render(&self, outcome: &BenchmarkOutcome) -> Result<String> {
        let registry = Registry::new();
        let test_uuid = outcome.correlation_id.to_string();

        let up = self.register(&registry, &self.up, SCRAPE_LABELS)?;
        up.with_label_values(&[test_uuid.as_str()])
            .set(if outcome.is_success() { 1.0 } else { 0.0 });

        if outcome.reached_benchmark() {
            let scrape_duration = self.register(&registry, &self.scrape_duration, SCRAPE_LABELS)?;
            scrape_duration
                .with_label_values(&[test_uuid.as_str()])
                .set(outcome.elapsed.as_secs_f64());
        }

        if let Some(labels) = result_labels(outcome) {
            let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();

            for measurement in Measurement::ALL {
                let Some(value) = outcome.measurements.get(measurement) else {
                    continue;
                };
                let opts = match measurement {
                    Measurement::Latency => &self.latency,
                    Measurement::Download => &self.download,
                    Measurement::Upload => &self.upload,
                };
                let gauge = self.register(&registry, opts, RESULT_LABELS)?;
                gauge.with_label_values(&label_refs).set(value);
            }
        }

        Ok(TextEncoder::new().encode_to_string(&registry.gather())?)
    }

    fn register(&self, registry: &Registry, opts: &Opts, labels: &[&str]) -> Result<GaugeVec> {
        let gauge = GaugeVec::new(opts.clone(), labels)?;
        registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }
}

impl Default for MetricEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Label values shared by every measurement, in `RESULT_LABELS` order.
fn result_labels(outcome: &BenchmarkOutcome) -> Option<Vec<String>> {
    let user = outcome.identity.as_ref()?;
    let server = outcome.server.as_ref()?;

    Some(vec![
        outcome.correlation_id.to_string(),
        user.lat.clone(),
        user.lon.clone(),
        user.ip.clone(),
        user.isp.clone(),
        server.lat.clone(),
        server.lon.clone(),
        server.id.clone(),
        server.name.clone(),
        server.country.clone(),
        format!("{:.6}", server.distance_km),
    ])
}
