use crate::deadline::Deadline;
use crate::error::{ExporterError, Result};
use crate::traits::SpeedProbe;
use crate::types::{Candidate, Measurement, Measurements, StageFailure};
use std::sync::Arc;
use tracing::{info, warn};

/// What one benchmark run produced: the measurements that succeeded and one
/// failure entry per measurement that did not.
#[derive(Debug, Default)]
pub struct RunReport {
    pub measurements: Measurements,
    pub failures: Vec<StageFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs latency, download and upload against a single server.
///
/// The measurements are independent: a failed one is logged and recorded,
/// and the next one still runs. Only the shared deadline stops the run early.
pub struct BenchmarkRunner {
    probe: Arc<dyn SpeedProbe>,
}

impl BenchmarkRunner {
    pub fn new(probe: Arc<dyn SpeedProbe>) -> Self {
        Self { probe }
    }

    pub async fn run(&self, server: &Candidate, deadline: &Deadline) -> RunReport {
        let mut report = RunReport::default();

        for measurement in Measurement::ALL {
            let stage = measurement.stage();
            match deadline.run(self.measure(measurement, server, deadline)).await {
                Ok(value) => {
                    info!(stage = %stage, value, server_id = %server.id, "measurement complete");
                    report.measurements.set(measurement, value);
                }
                Err(e) if e.is_deadline() => {
                    warn!(stage = %stage, "deadline exceeded, skipping remaining measurements");
                    report
                        .failures
                        .push(StageFailure::new(stage, ExporterError::DeadlineExceeded));
                    break;
                }
                Err(e) => {
                    let error = tag(measurement, e);
                    warn!(stage = %stage, error = %error, "measurement failed");
                    report.failures.push(StageFailure::new(stage, error));
                }
            }
        }

        report
    }

    async fn measure(
        &self,
        measurement: Measurement,
        server: &Candidate,
        deadline: &Deadline,
    ) -> Result<f64> {
        match measurement {
            Measurement::Latency => Ok(self.probe.latency(server, deadline).await?.as_secs_f64()),
            Measurement::Download => self.probe.download(server, deadline).await,
            Measurement::Upload => self.probe.upload(server, deadline).await,
        }
    }
}

fn tag(measurement: Measurement, error: ExporterError) -> ExporterError {
    match (measurement, error) {
        (_, e @ ExporterError::DeadlineExceeded) => e,
        (Measurement::Latency, e @ ExporterError::LatencyFailed(_))
        | (Measurement::Download, e @ ExporterError::DownloadFailed(_))
        | (Measurement::Upload, e @ ExporterError::UploadFailed(_)) => e,
        (Measurement::Latency, e) => ExporterError::LatencyFailed(e.to_string()),
        (Measurement::Download, e) => ExporterError::DownloadFailed(e.to_string()),
        (Measurement::Upload, e) => ExporterError::UploadFailed(e.to_string()),
    }
}
