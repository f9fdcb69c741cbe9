//! Waypoint post-processing: segment checks, simplification and refinement.

use super::astar::{self, SearchLimits, SearchOutcome};
use super::grid::{Grid, GridCell};
use crate::classifier::WaterClassifier;
use crate::geo::{segment_steps, BoundingBox, GeoPoint};

/// True when every sample on `start..=end`, spaced at most `interval_m`, is water.
pub fn segment_is_water(
    classifier: &mut WaterClassifier,
    start: &GeoPoint,
    end: &GeoPoint,
    interval_m: f64,
) -> bool {
    let steps = segment_steps(start, end, interval_m);
    (0..=steps).all(|i| classifier.is_water(start.lerp(end, i as f64 / steps as f64)))
}

/// Grid cells to coordinates with the exact endpoints at both ends.
pub fn cells_to_waypoints(
    grid: &Grid,
    cells: &[GridCell],
    start: GeoPoint,
    end: GeoPoint,
) -> Vec<GeoPoint> {
    let mut waypoints = Vec::with_capacity(cells.len() + 2);
    waypoints.push(start);
    waypoints.extend(cells.iter().map(|cell| grid.point(*cell)));
    waypoints.push(end);
    waypoints.dedup();
    waypoints
}

/// Greedy line-of-sight simplification.
///
/// From each anchor, keep extending to later waypoints while the straight
/// segment stays on water and stop at the first one that does not. The next
/// waypoint is always kept, even when the segment to it crosses land, so the
/// refinement pass can see it.
pub fn simplify(
    classifier: &mut WaterClassifier,
    waypoints: &[GeoPoint],
    interval_m: f64,
) -> Vec<GeoPoint> {
    if waypoints.len() <= 2 {
        return waypoints.to_vec();
    }

    let mut simplified = vec![waypoints[0]];
    let mut anchor = 0;
    while anchor < waypoints.len() - 1 {
        let mut reach = anchor + 1;
        while reach + 1 < waypoints.len()
            && segment_is_water(classifier, &waypoints[anchor], &waypoints[reach + 1], interval_m)
        {
            reach += 1;
        }
        simplified.push(waypoints[reach]);
        anchor = reach;
    }
    simplified
}

#[derive(Debug, Clone, Copy)]
pub struct RefineSettings {
    pub interval_m: f64,
    pub grid_deg: f64,
    pub max_iterations: usize,
    pub edge_samples: usize,
    pub goal_tolerance: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefineOutcome {
    Valid {
        waypoints: Vec<GeoPoint>,
        nodes_visited: usize,
    },
    /// A pair crossed land and its local re-plan did not yield a clean path.
    Invalid { nodes_visited: usize },
}

/// Check every consecutive pair and re-plan the ones that cross land on a
/// fine local grid. Re-planned legs are checked once more before acceptance.
pub fn validate_and_refine(
    classifier: &mut WaterClassifier,
    waypoints: &[GeoPoint],
    bounds: &BoundingBox,
    settings: &RefineSettings,
) -> RefineOutcome {
    let mut nodes_visited = 0;
    let Some(first) = waypoints.first() else {
        return RefineOutcome::Invalid { nodes_visited };
    };

    let mut refined = vec![*first];
    for pair in waypoints.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        if segment_is_water(classifier, &from, &to, settings.interval_m) {
            refined.push(to);
            continue;
        }

        tracing::debug!(
            "Leg ({:.5}, {:.5}) -> ({:.5}, {:.5}) crosses land, refining",
            from.lat,
            from.lon,
            to.lat,
            to.lon
        );
        let (leg, visited) = refine_leg(classifier, from, to, bounds, settings);
        nodes_visited += visited;
        let Some(leg) = leg else {
            return RefineOutcome::Invalid { nodes_visited };
        };
        let clean = leg
            .windows(2)
            .all(|seg| segment_is_water(classifier, &seg[0], &seg[1], settings.interval_m));
        if !clean {
            return RefineOutcome::Invalid { nodes_visited };
        }
        refined.extend(leg.into_iter().skip(1));
    }

    refined.dedup();
    RefineOutcome::Valid {
        waypoints: refined,
        nodes_visited,
    }
}

/// Local A* between one pair, on a grid anchored at `from`.
fn refine_leg(
    classifier: &mut WaterClassifier,
    from: GeoPoint,
    to: GeoPoint,
    bounds: &BoundingBox,
    settings: &RefineSettings,
) -> (Option<Vec<GeoPoint>>, usize) {
    let grid = Grid::new(from, settings.grid_deg);
    let span = (to.lat - from.lat).abs().max((to.lon - from.lon).abs());
    let margin = (span * 0.5).max(settings.grid_deg * 10.0);
    let local = clamp_box(&BoundingBox::around(from, to).expand(margin), bounds);

    let limits = SearchLimits {
        max_iterations: settings.max_iterations,
        edge_samples: settings.edge_samples,
        goal_tolerance: settings.goal_tolerance,
    };
    let start = grid.cell_of(from);
    let goal = grid.cell_of(to);
    match astar::search(classifier, &grid, start, goal, &local, &limits) {
        SearchOutcome::Found {
            cells,
            nodes_visited,
        } => {
            let leg = cells_to_waypoints(&grid, &cells, from, to);
            (Some(simplify(classifier, &leg, settings.interval_m)), nodes_visited)
        }
        outcome => (None, outcome.nodes_visited()),
    }
}

fn clamp_box(inner: &BoundingBox, outer: &BoundingBox) -> BoundingBox {
    BoundingBox::new(
        inner.min_lat.max(outer.min_lat),
        inner.min_lon.max(outer.min_lon),
        inner.max_lat.min(outer.max_lat),
        inner.max_lon.min(outer.max_lon),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WaterClassification;
    use crate::source::{SourceError, SourceStats, WaterSource};

    /// Square island centred on the origin, 0.002° on each side.
    struct Island;

    impl WaterSource for Island {
        fn classify(&self, point: GeoPoint) -> Option<WaterClassification> {
            let land = point.lat.abs() <= 0.001 && point.lon.abs() <= 0.001;
            Some(if land {
                WaterClassification::Land
            } else {
                WaterClassification::Ocean
            })
        }

        fn preload(&mut self, _bounds: &BoundingBox) -> Result<usize, SourceError> {
            Ok(0)
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                kind: "island".to_string(),
                resident_units: 1,
                capacity: 1,
                ready: true,
            }
        }
    }

    fn classifier() -> WaterClassifier {
        WaterClassifier::new(Box::new(Island), 100_000)
    }

    fn settings() -> RefineSettings {
        RefineSettings {
            interval_m: 11.0,
            grid_deg: 0.0005,
            max_iterations: 20_000,
            edge_samples: 4,
            goal_tolerance: 2,
        }
    }

    #[test]
    fn simplify_drops_collinear_points() {
        let mut classifier = classifier();
        let points: Vec<GeoPoint> = (0..=10)
            .map(|i| GeoPoint::new(0.01, -0.01 + i as f64 * 0.002))
            .collect();
        let simplified = simplify(&mut classifier, &points, 11.0);
        assert_eq!(simplified, vec![points[0], points[10]]);
    }

    #[test]
    fn simplify_keeps_corner_around_island() {
        let mut classifier = classifier();
        let points = vec![
            GeoPoint::new(0.0, -0.003),
            GeoPoint::new(0.002, -0.002),
            GeoPoint::new(0.002, 0.0),
            GeoPoint::new(0.002, 0.002),
            GeoPoint::new(0.0, 0.003),
        ];
        let simplified = simplify(&mut classifier, &points, 11.0);
        assert!(simplified.len() >= 3, "{simplified:?}");
        assert_eq!(simplified.first(), points.first());
        assert_eq!(simplified.last(), points.last());
        for pair in simplified.windows(2) {
            assert!(segment_is_water(&mut classifier, &pair[0], &pair[1], 11.0));
        }
    }

    #[test]
    fn refine_replans_leg_through_island() {
        let mut classifier = classifier();
        let from = GeoPoint::new(0.0, -0.004);
        let to = GeoPoint::new(0.0, 0.004);
        let bounds = BoundingBox::new(-0.05, -0.05, 0.05, 0.05);

        let outcome = validate_and_refine(&mut classifier, &[from, to], &bounds, &settings());
        let RefineOutcome::Valid { waypoints, .. } = outcome else {
            panic!("expected refined path, got {outcome:?}");
        };
        assert!(waypoints.len() > 2);
        assert_eq!(waypoints.first(), Some(&from));
        assert_eq!(waypoints.last(), Some(&to));
        for pair in waypoints.windows(2) {
            assert!(segment_is_water(&mut classifier, &pair[0], &pair[1], 11.0));
        }
    }

    #[test]
    fn refine_fails_when_box_leaves_no_way_around() {
        let mut classifier = classifier();
        let from = GeoPoint::new(0.0, -0.004);
        let to = GeoPoint::new(0.0, 0.004);
        // no room north or south of the island
        let bounds = BoundingBox::new(-0.0009, -0.05, 0.0009, 0.05);

        let outcome = validate_and_refine(&mut classifier, &[from, to], &bounds, &settings());
        assert!(matches!(outcome, RefineOutcome::Invalid { .. }), "{outcome:?}");
    }
}
