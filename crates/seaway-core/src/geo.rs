//! Spatial math for water classification and route distances.

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const METERS_PER_NM: f64 = 1_852.0;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        haversine_distance(self.lat, self.lon, other.lat, other.lon)
    }

    /// Great-circle distance to `other` in nautical miles.
    pub fn distance_nm(&self, other: &GeoPoint) -> f64 {
        self.distance_m(other) / METERS_PER_NM
    }

    /// Linear interpolation in degree space, `t` in `[0, 1]`.
    pub fn lerp(&self, other: &GeoPoint, t: f64) -> GeoPoint {
        GeoPoint {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }
}

/// Axis-aligned box in degrees. `min_lon > max_lon` marks an antimeridian crossing,
/// which the water sources refuse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub const fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Smallest box holding both points.
    pub fn around(a: GeoPoint, b: GeoPoint) -> Self {
        Self {
            min_lat: a.lat.min(b.lat),
            min_lon: a.lon.min(b.lon),
            max_lat: a.lat.max(b.lat),
            max_lon: a.lon.max(b.lon),
        }
    }

    /// Grow on every side by `margin_deg`, clamped to valid latitudes/longitudes.
    pub fn expand(&self, margin_deg: f64) -> Self {
        Self {
            min_lat: (self.min_lat - margin_deg).max(-90.0),
            min_lon: (self.min_lon - margin_deg).max(-180.0),
            max_lat: (self.max_lat + margin_deg).min(90.0),
            max_lon: (self.max_lon + margin_deg).min(180.0),
        }
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lon > self.max_lon
    }

    pub fn is_valid(&self) -> bool {
        let finite = self.min_lat.is_finite()
            && self.min_lon.is_finite()
            && self.max_lat.is_finite()
            && self.max_lon.is_finite();
        finite
            && self.min_lat <= self.max_lat
            && (-90.0..=90.0).contains(&self.min_lat)
            && (-90.0..=90.0).contains(&self.max_lat)
            && (-180.0..=180.0).contains(&self.min_lon)
            && (-180.0..=180.0).contains(&self.max_lon)
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lon >= self.min_lon
            && point.lon <= self.max_lon
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
            && self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
    }
}

/// Calculate distance between two points in meters using Haversine formula.
///
/// # Arguments
/// * `lat1`, `lon1` - First point coordinates in decimal degrees
/// * `lat2`, `lon2` - Second point coordinates in decimal degrees
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

pub fn haversine_nm(a: &GeoPoint, b: &GeoPoint) -> f64 {
    a.distance_nm(b)
}

/// Total length of a polyline in nautical miles.
pub fn path_length_nm(points: &[GeoPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| pair[0].distance_nm(&pair[1]))
        .sum()
}

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// Number of intervals needed so consecutive samples are at most `interval_m` apart.
pub fn segment_steps(start: &GeoPoint, end: &GeoPoint, interval_m: f64) -> usize {
    let distance_m = start.distance_m(end);
    (distance_m / interval_m.max(0.1)).ceil().max(1.0) as usize
}

/// Evenly spaced points from `start` to `end` inclusive, at most `interval_m` apart.
pub fn sample_segment<'a>(
    start: &'a GeoPoint,
    end: &'a GeoPoint,
    interval_m: f64,
) -> impl Iterator<Item = GeoPoint> + 'a {
    let steps = segment_steps(start, end, interval_m);
    (0..=steps).map(move |i| start.lerp(end, i as f64 / steps as f64))
}
