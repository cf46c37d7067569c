use crate::error::ExporterError;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// 调用方的网络位置 (caller's observed network position)
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub ip: String,
    pub isp: String,
    /// Coordinates exactly as the upstream reported them.
    pub lat: String,
    pub lon: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// 测速服务器候选 (a benchmark server, ranked by distance from the caller)
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub country: String,
    pub lat: String,
    pub lon: String,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_km: f64,
    /// Upload endpoint; latency and download resources live next to it.
    pub url: String,
}

impl Candidate {
    #[cfg(test)]
    pub fn new(id: &str, name: &str, distance_km: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            country: String::new(),
            lat: "0".to_string(),
            lon: "0".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            distance_km,
            url: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionPolicy {
    Closest,
    Pinned {
        server_id: String,
        allow_fallback: bool,
    },
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closest => write!(f, "closest"),
            Self::Pinned {
                server_id,
                allow_fallback,
            } => write!(f, "pinned({server_id}, fallback={allow_fallback})"),
        }
    }
}

/// One step of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Identity,
    Candidates,
    Selection,
    Latency,
    Download,
    Upload,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Candidates => "candidates",
            Self::Selection => "selection",
            Self::Latency => "latency",
            Self::Download => "download",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The benchmark measurements, a subset of [`Stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    Latency,
    Download,
    Upload,
}

impl Measurement {
    /// In the order they run.
    pub const ALL: [Measurement; 3] = [Self::Latency, Self::Download, Self::Upload];

    pub fn stage(self) -> Stage {
        match self {
            Self::Latency => Stage::Latency,
            Self::Download => Stage::Download,
            Self::Upload => Stage::Upload,
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stage().as_str())
    }
}

#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: ExporterError,
}

impl StageFailure {
    pub fn new(stage: Stage, error: ExporterError) -> Self {
        Self { stage, error }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.error)
    }
}

/// 测速结果; a missing value means the measurement failed or never ran.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurements {
    pub latency_seconds: Option<f64>,
    pub download_bytes_per_sec: Option<f64>,
    pub upload_bytes_per_sec: Option<f64>,
}

impl Measurements {
    pub fn get(&self, measurement: Measurement) -> Option<f64> {
        match measurement {
            Measurement::Latency => self.latency_seconds,
            Measurement::Download => self.download_bytes_per_sec,
            Measurement::Upload => self.upload_bytes_per_sec,
        }
    }

    pub fn set(&mut self, measurement: Measurement, value: f64) {
        let slot = match measurement {
            Measurement::Latency => &mut self.latency_seconds,
            Measurement::Download => &mut self.download_bytes_per_sec,
            Measurement::Upload => &mut self.upload_bytes_per_sec,
        };
        *slot = Some(value);
    }
}

/// The complete, possibly partial, result of one collection.
#[derive(Debug)]
pub struct BenchmarkOutcome {
    pub correlation_id: Uuid,
    pub identity: Option<Identity>,
    pub server: Option<Candidate>,
    pub measurements: Measurements,
    pub failures: Vec<StageFailure>,
    pub elapsed: Duration,
}

impl BenchmarkOutcome {
    pub fn new(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            identity: None,
            server: None,
            measurements: Measurements::default(),
            failures: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// True only when a server was benchmarked and no step failed.
    pub fn is_success(&self) -> bool {
        self.server.is_some() && self.failures.is_empty()
    }

    pub fn reached_benchmark(&self) -> bool {
        self.server.is_some()
    }

    #[cfg(test)]
    pub fn failure(&self, stage: Stage) -> Option<&StageFailure> {
        self.failures.iter().find(|f| f.stage == stage)
    }
}
