//! Data models for water classification and route planning.

use crate::geo::{haversine_nm, GeoPoint};
use serde::{Deserialize, Serialize};

/// Surface type beneath a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaterClassification {
    Ocean,
    Lake,
    Land,
}

impl WaterClassification {
    pub fn is_water(self) -> bool {
        matches!(self, WaterClassification::Ocean | WaterClassification::Lake)
    }

    /// Raster cell code: 0 land, 1 ocean, 2 lake. Unknown codes are land.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => WaterClassification::Ocean,
            2 => WaterClassification::Lake,
            _ => WaterClassification::Land,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            WaterClassification::Land => 0,
            WaterClassification::Ocean => 1,
            WaterClassification::Lake => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RouteRequest {
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub max_iterations: usize,
}

/// Why a route could not be produced. The first six come from the planner;
/// the rest are produced by the worker boundary when it has to degrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    StartOnLand,
    EndOnLand,
    NoPathFound,
    DistanceTooLong,
    NarrowChannel,
    MaxIterationsExceeded,
    DataUnavailable,
    WorkerUnavailable,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResult {
    pub success: bool,
    pub waypoints: Vec<GeoPoint>,
    /// Nautical miles along `waypoints`.
    pub distance_nm: f64,
    pub failure_reason: Option<FailureReason>,
    pub nodes_visited: usize,
    pub tiers_tried: usize,
    /// Grid spacing of the tier that produced the route, if grid search ran.
    pub grid_deg: Option<f64>,
}

impl RouteResult {
    /// Two-point route that is known to be all water.
    pub fn direct(start: GeoPoint, end: GeoPoint) -> Self {
        Self {
            success: true,
            waypoints: vec![start, end],
            distance_nm: haversine_nm(&start, &end),
            failure_reason: None,
            nodes_visited: 0,
            tiers_tried: 0,
            grid_deg: None,
        }
    }

    /// Failed result. Still carries the straight line so callers can draw it.
    pub fn failed(start: GeoPoint, end: GeoPoint, reason: FailureReason) -> Self {
        Self {
            success: false,
            failure_reason: Some(reason),
            ..Self::direct(start, end)
        }
    }

    /// True when the route needed more than its endpoints or did not succeed.
    pub fn crosses_land(&self) -> bool {
        !self.success || self.waypoints.len() > 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_route_keeps_direct_line() {
        let start = GeoPoint::new(47.60, -122.35);
        let end = GeoPoint::new(47.62, -122.33);
        let result = RouteResult::failed(start, end, FailureReason::StartOnLand);
        assert!(!result.success);
        assert_eq!(result.waypoints, vec![start, end]);
        assert!(result.distance_nm > 1.0);
        assert!(result.crosses_land());
    }

    #[test]
    fn classification_codes_and_serde() {
        for class in [
            WaterClassification::Ocean,
            WaterClassification::Lake,
            WaterClassification::Land,
        ] {
            assert_eq!(WaterClassification::from_code(class.code()), class);
        }
        assert_eq!(WaterClassification::from_code(200), WaterClassification::Land);
        assert_eq!(
            serde_json::to_string(&WaterClassification::Lake).unwrap(),
            "\"lake\""
        );
        assert_eq!(
            serde_json::to_string(&FailureReason::StartOnLand).unwrap(),
            "\"StartOnLand\""
        );
    }
}
