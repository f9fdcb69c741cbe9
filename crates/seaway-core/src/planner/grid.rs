//! Search grid at one resolution, anchored on the route start.

use crate::classifier::WaterClassifier;
use crate::geo::{BoundingBox, GeoPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    pub lat: i32,
    pub lon: i32,
}

impl GridCell {
    pub fn offset(&self, d_lat: i32, d_lon: i32) -> GridCell {
        GridCell {
            lat: self.lat + d_lat,
            lon: self.lon + d_lon,
        }
    }

    /// Cells between the two, counting diagonal steps as one.
    pub fn chebyshev(&self, other: &GridCell) -> i32 {
        (self.lat - other.lat).abs().max((self.lon - other.lon).abs())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Grid {
    origin: GeoPoint,
    step_deg: f64,
}

impl Grid {
    pub fn new(origin: GeoPoint, step_deg: f64) -> Self {
        Self {
            origin,
            step_deg: step_deg.max(1e-7),
        }
    }

    pub fn step_deg(&self) -> f64 {
        self.step_deg
    }

    pub fn point(&self, cell: GridCell) -> GeoPoint {
        GeoPoint::new(
            self.origin.lat + cell.lat as f64 * self.step_deg,
            self.origin.lon + cell.lon as f64 * self.step_deg,
        )
    }

    pub fn cell_of(&self, point: GeoPoint) -> GridCell {
        GridCell {
            lat: ((point.lat - self.origin.lat) / self.step_deg).round() as i32,
            lon: ((point.lon - self.origin.lon) / self.step_deg).round() as i32,
        }
    }

    /// Nearest water cell to `target`, searching rings of growing radius.
    /// Within the first ring that has any water, the closest cell wins.
    pub fn snap_to_water(
        &self,
        classifier: &mut WaterClassifier,
        target: GeoPoint,
        max_radius: i32,
        bounds: &BoundingBox,
    ) -> Option<GridCell> {
        let center = self.cell_of(target);
        for radius in 0..=max_radius.max(0) {
            let mut best: Option<(f64, GridCell)> = None;
            for cell in ring(center, radius) {
                let point = self.point(cell);
                if !bounds.contains(&point) || !classifier.is_water(point) {
                    continue;
                }
                let distance = point.distance_m(&target);
                if best.map_or(true, |(closest, _)| distance < closest) {
                    best = Some((distance, cell));
                }
            }
            if let Some((_, cell)) = best {
                return Some(cell);
            }
        }
        None
    }
}

/// Cells at exactly `radius` (Chebyshev) from `center`.
fn ring(center: GridCell, radius: i32) -> impl Iterator<Item = GridCell> {
    (-radius..=radius).flat_map(move |d_lat| {
        (-radius..=radius)
            .filter(move |d_lon| d_lat.abs().max(d_lon.abs()) == radius)
            .map(move |d_lon| center.offset(d_lat, d_lon))
    })
}
