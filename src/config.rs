use crate::error::{ExporterError, Result};
use crate::types::SelectionPolicy;
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Server ID value meaning "no pinned server".
pub const CLOSEST_SERVER_ID: &str = "-1";

#[derive(Parser, Debug, Clone)]
#[command(name = "speedtest_exporter")]
#[command(
    about = "Prometheus exporter that runs a speedtest.net benchmark on every scrape",
    long_about = None
)]
pub struct Config {
    /// Address on which to expose metrics and web interface
    #[arg(long = "web.listen-address", default_value = ":9090")]
    pub listen_address: String,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", default_value = "/metrics")]
    pub metrics_path: String,

    /// Speedtest.net server ID to run test against, -1 will pick the closest server
    /// to your location
    #[arg(long = "server_id", default_value = CLOSEST_SERVER_ID, allow_hyphen_values = true)]
    pub server_id: String,

    /// If the server_id given is not available, should we fallback to closest available server
    #[arg(long = "server_fallback")]
    pub server_fallback: bool,

    /// Deadline for one full collection (e.g. 60s, 2m)
    #[arg(long = "timeout", default_value = "60s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// URL fetched by /health to check outbound connectivity
    #[arg(
        long = "health.check-url",
        default_value = "https://clients3.google.com/generate_204"
    )]
    pub health_check_url: String,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.metrics_path.starts_with('/') {
            return Err(ExporterError::Config(format!(
                "telemetry path '{}' must start with '/'",
                self.metrics_path
            )));
        }
        if self.metrics_path == "/" || self.metrics_path == "/health" {
            return Err(ExporterError::Config(format!(
                "telemetry path '{}' collides with a built-in page",
                self.metrics_path
            )));
        }
        if self.timeout.is_zero() {
            return Err(ExporterError::Config("timeout must be greater than zero".to_string()));
        }
        if self.server_id.trim().is_empty() {
            return Err(ExporterError::Config("server_id must not be empty".to_string()));
        }
        self.listen_addr()?;
        Ok(())
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        let id = self.server_id.trim();
        if id == CLOSEST_SERVER_ID {
            SelectionPolicy::Closest
        } else {
            SelectionPolicy::Pinned {
                server_id: id.to_string(),
                allow_fallback: self.server_fallback,
            }
        }
    }

    /// Parse the listen address; a bare `:port` binds every interface.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let raw = self.listen_address.trim();
        let normalized = if raw.starts_with(':') {
            format!("0.0.0.0{raw}")
        } else {
            raw.to_string()
        };

        normalized.parse().map_err(|e| {
            ExporterError::Config(format!(
                "invalid listen address '{}': {}",
                self.listen_address, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["speedtest_exporter"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.metrics_path, "/metrics");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.selection_policy(), SelectionPolicy::Closest);
        assert_eq!(
            config.listen_addr().unwrap(),
            "0.0.0.0:9090".parse::<SocketAddr>().unwrap()
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pinned_server_with_fallback() {
        let config = parse(&[
            "--server_id",
            "12345",
            "--server_fallback",
            "--timeout",
            "2m",
        ]);
        assert_eq!(
            config.selection_policy(),
            SelectionPolicy::Pinned {
                server_id: "12345".to_string(),
                allow_fallback: true,
            }
        );
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_explicit_closest_id() {
        let config = parse(&["--server_id", "-1"]);
        assert_eq!(config.selection_policy(), SelectionPolicy::Closest);
    }

    #[test]
    fn test_explicit_listen_address() {
        let config = parse(&["--web.listen-address", "127.0.0.1:9798"]);
        assert_eq!(config.listen_addr().unwrap().port(), 9798);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(parse(&["--web.telemetry-path", "metrics"]).validate().is_err());
        assert!(parse(&["--web.telemetry-path", "/health"]).validate().is_err());
        assert!(parse(&["--timeout", "0s"]).validate().is_err());
        assert!(parse(&["--web.listen-address", "nowhere"]).validate().is_err());
        assert!(Config::try_parse_from(["speedtest_exporter", "--timeout", "soon"]).is_err());
    }
}
