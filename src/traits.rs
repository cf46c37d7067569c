use crate::deadline::Deadline;
use crate::error::Result;
use crate::types::{Candidate, Identity};
use async_trait::async_trait;
use std::time::Duration;

/// CandidateSource: 调用方身份与测速服务器列表的来源
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Resolve the caller's public IP, ISP and geolocation.
    async fn fetch_identity(&self, deadline: &Deadline) -> Result<Identity>;

    /// Benchmark servers, sorted by ascending distance from `identity`.
    async fn fetch_candidates(&self, identity: &Identity, deadline: &Deadline)
        -> Result<Vec<Candidate>>;
}

/// SpeedProbe: the three network sub-measurements run against one server.
#[async_trait]
pub trait SpeedProbe: Send + Sync {
    /// Round-trip time.
    async fn latency(&self, server: &Candidate, deadline: &Deadline) -> Result<Duration>;

    /// Inbound throughput in bytes per second.
    async fn download(&self, server: &Candidate, deadline: &Deadline) -> Result<f64>;

    /// Outbound throughput in bytes per second.
    async fn upload(&self, server: &Candidate, deadline: &Deadline) -> Result<f64>;
}
