use super::SpeedtestClient;
use crate::deadline::Deadline;
use crate::error::{ExporterError, Result};
use crate::traits::CandidateSource;
use crate::types::{Candidate, Identity};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// 服务器列表条目 (one entry of the speedtest.net server list)
#[derive(Debug, Deserialize)]
struct ServerEntry {
    id: String,
    name: String,
    #[serde(default)]
    country: String,
    lat: String,
    lon: String,
    url: String,
}

#[async_trait]
impl CandidateSource for SpeedtestClient {
    async fn fetch_identity(&self, deadline: &Deadline) -> Result<Identity> {
        let body = self
            .http
            .get(&self.config_url)
            .timeout(deadline.remaining())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_client(&body)
    }

    async fn fetch_candidates(
        &self,
        identity: &Identity,
        deadline: &Deadline,
    ) -> Result<Vec<Candidate>> {
        let body = self
            .http
            .get(&self.servers_url)
            .timeout(deadline.remaining())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let entries: Vec<ServerEntry> = serde_json::from_str(&body)?;
        let candidates = rank_servers(identity, entries);
        debug!(count = candidates.len(), "fetched server list");
        Ok(candidates)
    }
}

/// Extract the `<client .../>` element of speedtest-config.php.
fn parse_client(xml: &str) -> Result<Identity> {
    let element = Regex::new(r"<client\s([^>]*)/?>")?;
    let attribute = Regex::new(r#"([A-Za-z_]+)="([^"]*)""#)?;

    let caps = element.captures(xml).ok_or_else(|| {
        ExporterError::LookupFailed("no client element in speedtest config".to_string())
    })?;

    let attrs: HashMap<&str, &str> = attribute
        .captures_iter(&caps[1])
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect();

    let field = |name: &str| -> Result<String> {
        attrs
            .get(name)
            .map(|v| unescape(v))
            .ok_or_else(|| ExporterError::LookupFailed(format!("client element has no '{name}'")))
    };
    let coordinate = |name: &str, raw: &str| -> Result<f64> {
        raw.trim()
            .parse::<f64>()
            .map_err(|_| ExporterError::LookupFailed(format!("client '{name}' is not a number")))
    };

    let lat = field("lat")?;
    let lon = field("lon")?;
    Ok(Identity {
        ip: field("ip")?,
        isp: field("isp")?,
        latitude: coordinate("lat", &lat)?,
        longitude: coordinate("lon", &lon)?,
        lat,
        lon,
    })
}

fn unescape(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Convert raw entries into candidates ordered by distance from the caller.
/// Entries without usable coordinates are dropped.
fn rank_servers(identity: &Identity, entries: Vec<ServerEntry>) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = entries
        .into_iter()
        .filter_map(|entry| {
            let latitude = entry.lat.trim().parse::<f64>().ok()?;
            let longitude = entry.lon.trim().parse::<f64>().ok()?;
            let distance_km =
                haversine_km(identity.latitude, identity.longitude, latitude, longitude);

            Some(Candidate {
                id: entry.id,
                name: entry.name,
                country: entry.country,
                lat: entry.lat,
                lon: entry.lon,
                latitude,
                longitude,
                distance_km,
                url: entry.url,
            })
        })
        .collect();

    // stable: equal distances keep the service's order
    candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    candidates
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const CONFIG_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<settings>
<client ip="203.0.113.7" lat="51.5072" lon="-0.1276" isp="Fast &amp; Cheap"
    isprating="3.7" rating="0" country="GB" />
<server-config threadcount="4" ignoreids="" />
</settings>"#;

    const SERVERS_JSON: &str = r#"[
        {
            "url": "http://far.example.net:8080/speedtest/upload.php",
            "lat": "48.8566", "lon": "2.3522",
            "name": "Paris", "country": "France", "cc": "FR",
            "sponsor": "Far Co", "id": "200", "host": "far.example.net:8080"
        },
        {
            "url": "http://near.example.net:8080/speedtest/upload.php",
            "lat": "51.507", "lon": "-0.128",
            "name": "London", "country": "United Kingdom", "cc": "GB",
            "sponsor": "Near Co", "id": "100", "host": "near.example.net:8080"
        },
        {
            "url": "http://broken.example.net/upload.php",
            "lat": "n/a", "lon": "0",
            "name": "Broken", "country": "Nowhere", "sponsor": "", "id": "300"
        }
    ]"#;

    fn london() -> Identity {
        Identity {
            ip: "203.0.113.7".to_string(),
            isp: "Example".to_string(),
            lat: "51.5072".to_string(),
            lon: "-0.1276".to_string(),
            latitude: 51.5072,
            longitude: -0.1276,
        }
    }

    #[test]
    fn test_parse_client() {
        let identity = parse_client(CONFIG_XML).unwrap();
        assert_eq!(identity.ip, "203.0.113.7");
        assert_eq!(identity.isp, "Fast & Cheap");
        assert_eq!(identity.latitude, 51.5072);
        assert_eq!(identity.longitude, -0.1276);
        assert_eq!(identity.lat, "51.5072");
        assert_eq!(identity.lon, "-0.1276");
    }

    #[test]
    fn test_parse_client_missing_element() {
        let err = parse_client("<settings></settings>").unwrap_err();
        assert!(matches!(err, ExporterError::LookupFailed(_)));
    }

    #[test]
    fn test_parse_client_bad_coordinate() {
        let xml = r#"<client ip="1.1.1.1" lat="north" lon="0" isp="x" />"#;
        let err = parse_client(xml).unwrap_err();
        assert!(matches!(err, ExporterError::LookupFailed(msg) if msg.contains("lat")));
    }

    #[test]
    fn test_rank_servers_orders_by_distance() {
        let entries: Vec<ServerEntry> = serde_json::from_str(SERVERS_JSON).unwrap();
        let ranked = rank_servers(&london(), entries);

        let ids: Vec<&str> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["100", "200"]);
        assert!(ranked[0].distance_km < 1.0);
        assert!((ranked[1].distance_km - 343.5).abs() < 5.0);
        assert_eq!(ranked[1].country, "France");
        assert_eq!(ranked[1].lat, "48.8566");
        assert_eq!(ranked[1].lon, "2.3522");
    }

    #[test]
    fn test_haversine_zero_and_symmetry() {
        assert_eq!(haversine_km(10.0, 20.0, 10.0, 20.0), 0.0);
        let there = haversine_km(51.5072, -0.1276, 40.7128, -74.0060);
        let back = haversine_km(40.7128, -74.0060, 51.5072, -0.1276);
        assert!((there - back).abs() < 1e-9);
        assert!((there - 5570.0).abs() < 20.0);
    }

    #[tokio::test]
    async fn test_fetch_from_local_service() {
        let app = Router::new()
            .route("/config.php", get(|| async { CONFIG_XML }))
            .route("/servers", get(|| async { SERVERS_JSON }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let client = SpeedtestClient::with_endpoints(
            &format!("http://{addr}/config.php"),
            &format!("http://{addr}/servers"),
        );
        let deadline = Deadline::after(Duration::from_secs(10), CancellationToken::new());

        let identity = client.fetch_identity(&deadline).await.unwrap();
        assert_eq!(identity.ip, "203.0.113.7");

        let candidates = client.fetch_candidates(&identity, &deadline).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "London");
    }

    #[tokio::test]
    async fn test_fetch_reports_http_errors() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, Router::new()).await });

        let client = SpeedtestClient::with_endpoints(
            &format!("http://{addr}/missing"),
            &format!("http://{addr}/missing"),
        );
        let deadline = Deadline::after(Duration::from_secs(10), CancellationToken::new());

        let err = client.fetch_identity(&deadline).await.unwrap_err();
        assert!(matches!(err, ExporterError::Http(_)));
    }
}
