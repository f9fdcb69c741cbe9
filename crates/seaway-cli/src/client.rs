//! Blocking HTTP client for the Seaway server API.

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use seaway_core::{BoundingBox, FailureReason, GeoPoint, WaterClassification};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteBody {
    start_lat: f64,
    start_lon: f64,
    end_lat: f64,
    end_lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_iterations: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    pub success: bool,
    pub waypoints: Vec<GeoPoint>,
    pub distance: f64,
    pub crosses_land: bool,
    pub waypoint_count: usize,
    #[serde(default)]
    pub failure_reason: Option<FailureReason>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterResponse {
    pub lat: f64,
    pub lon: f64,
    pub classification: WaterClassification,
    pub is_water: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PreloadBody {
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
}

pub struct SeawayClient {
    client: Client,
    base_url: String,
}

impl SeawayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn route(
        &self,
        start: GeoPoint,
        end: GeoPoint,
        max_iterations: Option<usize>,
    ) -> Result<RouteResponse> {
        let body = RouteBody {
            start_lat: start.lat,
            start_lon: start.lon,
            end_lat: end.lat,
            end_lon: end.lon,
            max_iterations,
        };
        let response = self
            .client
            .post(format!("{}/v1/route", self.base_url))
            .json(&body)
            .send()
            .context("Failed to send route request")?;
        checked(response)?
            .json()
            .context("Failed to parse route response")
    }

    pub fn classify(&self, point: GeoPoint) -> Result<WaterResponse> {
        let response = self
            .client
            .get(format!("{}/v1/water", self.base_url))
            .query(&[("lat", point.lat), ("lon", point.lon)])
            .send()
            .context("Failed to send classification request")?;
        checked(response)?
            .json()
            .context("Failed to parse classification response")
    }

    /// Returns the number of units the server newly loaded.
    pub fn preload(&self, bounds: BoundingBox) -> Result<u64> {
        let body = PreloadBody {
            min_lat: bounds.min_lat,
            min_lon: bounds.min_lon,
            max_lat: bounds.max_lat,
            max_lon: bounds.max_lon,
        };
        let response = self
            .client
            .post(format!("{}/v1/water/preload", self.base_url))
            .json(&body)
            .send()
            .context("Failed to send preload request")?;
        let value: Value = checked(response)?
            .json()
            .context("Failed to parse preload response")?;
        value["loaded"]
            .as_u64()
            .context("Preload response has no 'loaded' count")
    }

    pub fn worker_status(&self) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/v1/worker", self.base_url))
            .send()
            .context("Failed to fetch worker status")?;
        checked(response)?
            .json()
            .context("Failed to parse worker status")
    }
}

fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    bail!("Server returned {}: {}", status, body)
}
