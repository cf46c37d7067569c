//! speedtest.net backed implementation of the collaborator traits.

pub mod lookup;
pub mod transfer;

use crate::error::{ExporterError, Result};
use crate::types::Candidate;
use reqwest::{Client, Url};

const CONFIG_URL: &str = "https://www.speedtest.net/speedtest-config.php";
const SERVERS_URL: &str = "https://www.speedtest.net/api/js/servers?engine=js&limit=10";

const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; speedtest_exporter/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

pub struct SpeedtestClient {
    http: Client,
    config_url: String,
    servers_url: String,
}

impl SpeedtestClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            config_url: CONFIG_URL.to_string(),
            servers_url: SERVERS_URL.to_string(),
        })
    }

    #[cfg(test)]
    pub fn with_endpoints(config_url: &str, servers_url: &str) -> Self {
        Self {
            http: Client::new(),
            config_url: config_url.to_string(),
            servers_url: servers_url.to_string(),
        }
    }
}

/// Resolve a file that lives next to the server's upload endpoint
/// (`.../speedtest/upload.php` -> `.../speedtest/latency.txt`).
pub(crate) fn resource_url(server: &Candidate, file: &str) -> Result<Url> {
    Url::parse(&server.url)
        .and_then(|base| base.join(file))
        .map_err(|e| ExporterError::Custom(format!("invalid server URL '{}': {}", server.url, e)))
}
