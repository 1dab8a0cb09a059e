//! Reqwest-backed street snapper.
//!
//! Calls an OSRM `nearest` service and returns the location of the closest
//! waypoint on the driving network.

use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use domains::models::Coordinate;
use domains::traits::StreetSnapper;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, instrument};

const DEFAULT_USER_AGENT: &str = "rusty-pothole/0.1";

#[derive(Debug, Deserialize)]
struct NearestResponse {
    code: String,
    #[serde(default)]
    waypoints: Vec<Waypoint>,
}

#[derive(Debug, Deserialize)]
struct Waypoint {
    /// `[longitude, latitude]`
    location: [f64; 2],
}

pub struct OsrmSnapper {
    client: Client,
    base_url: Url,
}

impl OsrmSnapper {
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self { client, base_url })
    }

    fn nearest_url(&self, point: Coordinate) -> anyhow::Result<Url> {
        let path = format!(
            "nearest/v1/driving/{},{}",
            point.longitude, point.latitude
        );
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(&path).context("unable to build OSRM url")
    }
}

fn parse_nearest(body: &[u8]) -> anyhow::Result<Coordinate> {
    let decoded: NearestResponse =
        serde_json::from_slice(body).context("invalid OSRM JSON payload")?;
    if decoded.code != "Ok" {
        bail!("OSRM answered with code {}", decoded.code);
    }
    let [longitude, latitude] = decoded
        .waypoints
        .first()
        .map(|w| w.location)
        .ok_or_else(|| anyhow!("OSRM returned no waypoints"))?;
    Ok(Coordinate::new(latitude, longitude))
}

#[async_trait]
impl StreetSnapper for OsrmSnapper {
    #[instrument(skip(self))]
    async fn snap(&self, point: Coordinate) -> anyhow::Result<Coordinate> {
        let url = self.nearest_url(point)?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .context("OSRM request failed")?;

        let status = response.status();
        let body = response.bytes().await.context("OSRM response unreadable")?;
        ensure_ok(status)?;

        let snapped = parse_nearest(&body)?;
        debug!(?snapped, "coordinate snapped to street");
        Ok(snapped)
    }
}

/// Only a plain 200 counts as an answer.
fn ensure_ok(status: StatusCode) -> anyhow::Result<()> {
    if status != StatusCode::OK {
        bail!("OSRM responded with HTTP {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_http_200_is_success() {
        assert!(ensure_ok(StatusCode::OK).is_ok());
        assert!(ensure_ok(StatusCode::NO_CONTENT).is_err());
        assert!(ensure_ok(StatusCode::ACCEPTED).is_err());
        assert!(ensure_ok(StatusCode::BAD_REQUEST).is_err());
    }

    #[test]
    fn parses_first_waypoint_as_lon_lat() {
        let body = br#"{
            "code": "Ok",
            "waypoints": [
                {"hint": "x", "distance": 4.2, "name": "Eastern Main Road", "location": [-61.27701, 10.726612]},
                {"location": [0.0, 0.0]}
            ]
        }"#;
        assert_eq!(
            parse_nearest(body).unwrap(),
            Coordinate::new(10.726612, -61.27701)
        );
    }

    #[test]
    fn rejects_error_codes_and_empty_waypoints() {
        assert!(parse_nearest(br#"{"code": "InvalidQuery", "message": "bad"}"#).is_err());
        assert!(parse_nearest(br#"{"code": "Ok", "waypoints": []}"#).is_err());
        assert!(parse_nearest(b"<html>bad gateway</html>").is_err());
    }

    #[test]
    fn builds_nearest_url_under_base_path() {
        let snapper = OsrmSnapper::new(
            Url::parse("http://osrm.local:5000/route-api").unwrap(),
            Duration::from_secs(2),
        )
        .unwrap();
        let url = snapper.nearest_url(Coordinate::new(10.5, -61.25)).unwrap();
        assert_eq!(
            url.as_str(),
            "http://osrm.local:5000/route-api/nearest/v1/driving/-61.25,10.5"
        );
    }
}
