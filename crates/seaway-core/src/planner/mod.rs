//! Water-only route planning.
//!
//! A straight line is tried first. When it crosses land the planner runs A*
//! over a sequence of grids, coarse to fine, and post-processes the first path
//! that survives validation.

pub mod astar;
pub mod grid;
pub mod path;

use crate::classifier::WaterClassifier;
use crate::geo::{path_length_nm, BoundingBox, GeoPoint};
use crate::models::{FailureReason, RouteRequest, RouteResult};
use astar::{SearchLimits, SearchOutcome};
use grid::Grid;
use path::{RefineOutcome, RefineSettings};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Spacing of the fine samples used for the direct check and validation.
    pub sample_interval_m: f64,
    /// Margin added around the start/end box before preloading.
    pub preload_margin_deg: f64,
    /// Routes longer than this are not searched.
    pub max_route_nm: f64,
    /// Failed routes shorter than this are reported as `NarrowChannel`.
    pub narrow_channel_nm: f64,
    pub snap_radius_cells: i32,
    pub edge_samples: usize,
    pub goal_tolerance_cells: i32,
    pub tier_count: usize,
    pub min_grid_deg: f64,
    pub refine_grid_deg: f64,
    pub refine_max_iterations: usize,
    /// Used when a request asks for zero iterations.
    pub default_max_iterations: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            sample_interval_m: 11.0,
            preload_margin_deg: 0.5,
            max_route_nm: 100.0,
            narrow_channel_nm: 5.0,
            snap_radius_cells: 6,
            edge_samples: 4,
            goal_tolerance_cells: 2,
            tier_count: 3,
            min_grid_deg: 0.0005,
            refine_grid_deg: 0.0005,
            refine_max_iterations: 20_000,
            default_max_iterations: 50_000,
        }
    }
}

/// Initial grid spacing in degrees for a route of `distance_nm`.
pub fn base_grid_deg(distance_nm: f64) -> f64 {
    if distance_nm > 50.0 {
        0.02
    } else if distance_nm > 20.0 {
        0.01
    } else if distance_nm > 5.0 {
        0.005
    } else if distance_nm > 1.0 {
        0.002
    } else {
        0.001
    }
}

#[derive(Debug)]
enum TierOutcome {
    Routed {
        waypoints: Vec<GeoPoint>,
        nodes_visited: usize,
    },
    Exhausted {
        nodes_visited: usize,
    },
    Failed {
        nodes_visited: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RoutePlanner {
    config: PlannerConfig,
}

impl RoutePlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Grid spacings to try, coarsest first, without repeats.
    pub fn tiers(&self, distance_nm: f64) -> Vec<f64> {
        let floor = self.config.min_grid_deg.max(1e-6);
        let mut grid_deg = base_grid_deg(distance_nm).max(floor);
        let mut tiers: Vec<f64> = Vec::with_capacity(self.config.tier_count);
        for _ in 0..self.config.tier_count.max(1) {
            if tiers.last().map_or(true, |last| (last - grid_deg).abs() > 1e-12) {
                tiers.push(grid_deg);
            }
            grid_deg = (grid_deg / 2.0).max(floor);
        }
        tiers
    }

    /// Plan a water-only route. Never fails: unroutable requests come back
    /// unsuccessful with the direct line and a reason.
    pub fn find_route(
        &self,
        classifier: &mut WaterClassifier,
        request: &RouteRequest,
    ) -> RouteResult {
        let start = request.start;
        let end = request.end;
        let config = &self.config;

        // Without resident data every point would read as land.
        let bounds = BoundingBox::around(start, end).expand(config.preload_margin_deg);
        if let Err(err) = classifier.preload(&bounds) {
            tracing::warn!("Preload for route failed: {}", err);
            return RouteResult::failed(start, end, FailureReason::DataUnavailable);
        }

        if !classifier.is_water(start) {
            return RouteResult::failed(start, end, FailureReason::StartOnLand);
        }
        if !classifier.is_water(end) {
            return RouteResult::failed(start, end, FailureReason::EndOnLand);
        }

        if path::segment_is_water(classifier, &start, &end, config.sample_interval_m) {
            return RouteResult::direct(start, end);
        }

        let distance_nm = start.distance_nm(&end);
        if distance_nm > config.max_route_nm {
            tracing::info!(
                "Route of {:.1} nm exceeds the {:.1} nm search ceiling",
                distance_nm,
                config.max_route_nm
            );
            return RouteResult::failed(start, end, FailureReason::DistanceTooLong);
        }

        let max_iterations = if request.max_iterations == 0 {
            config.default_max_iterations
        } else {
            request.max_iterations
        };

        let mut nodes_visited = 0;
        let mut tiers_tried = 0;
        let mut any_exhausted = false;

        for grid_deg in self.tiers(distance_nm) {
            tiers_tried += 1;
            match self.run_tier(classifier, start, end, grid_deg, &bounds, max_iterations) {
                TierOutcome::Routed {
                    waypoints,
                    nodes_visited: visited,
                } => {
                    nodes_visited += visited;
                    tracing::debug!(
                        "Route found at {} deg after {} tiers ({} waypoints)",
                        grid_deg,
                        tiers_tried,
                        waypoints.len()
                    );
                    return RouteResult {
                        success: true,
                        distance_nm: path_length_nm(&waypoints),
                        waypoints,
                        failure_reason: None,
                        nodes_visited,
                        tiers_tried,
                        grid_deg: Some(grid_deg),
                    };
                }
                TierOutcome::Exhausted { nodes_visited: visited } => {
                    nodes_visited += visited;
                    any_exhausted = true;
                    tracing::debug!("Tier {} deg exhausted its iteration budget", grid_deg);
                }
                TierOutcome::Failed { nodes_visited: visited } => {
                    nodes_visited += visited;
                    tracing::debug!("Tier {} deg produced no valid route", grid_deg);
                }
            }
        }

        let reason = if any_exhausted {
            FailureReason::MaxIterationsExceeded
        } else if distance_nm < config.narrow_channel_nm {
            FailureReason::NarrowChannel
        } else {
            FailureReason::NoPathFound
        };
        RouteResult {
            nodes_visited,
            tiers_tried,
            ..RouteResult::failed(start, end, reason)
        }
    }

    fn run_tier(
        &self,
        classifier: &mut WaterClassifier,
        start: GeoPoint,
        end: GeoPoint,
        grid_deg: f64,
        bounds: &BoundingBox,
        max_iterations: usize,
    ) -> TierOutcome {
        let config = &self.config;
        let grid = Grid::new(start, grid_deg);

        let snapped_start = grid.snap_to_water(classifier, start, config.snap_radius_cells, bounds);
        let snapped_end = grid.snap_to_water(classifier, end, config.snap_radius_cells, bounds);
        let (Some(start_cell), Some(end_cell)) = (snapped_start, snapped_end) else {
            tracing::debug!("No water cell near an endpoint at {} deg", grid_deg);
            return TierOutcome::Failed { nodes_visited: 0 };
        };

        let limits = SearchLimits {
            max_iterations,
            edge_samples: config.edge_samples,
            goal_tolerance: config.goal_tolerance_cells,
        };
        let (simplified, search_nodes) =
            match astar::search(classifier, &grid, start_cell, end_cell, bounds, &limits) {
                SearchOutcome::Found { cells, nodes_visited } => {
                    let raw = path::cells_to_waypoints(&grid, &cells, start, end);
                    (
                        path::simplify(classifier, &raw, config.sample_interval_m),
                        nodes_visited,
                    )
                }
                SearchOutcome::Exhausted { nodes_visited } => {
                    return TierOutcome::Exhausted { nodes_visited }
                }
                SearchOutcome::Unreachable { nodes_visited } => {
                    return TierOutcome::Failed { nodes_visited }
                }
            };

        let settings = RefineSettings {
            interval_m: config.sample_interval_m,
            grid_deg: config.refine_grid_deg.min(grid_deg),
            max_iterations: config.refine_max_iterations,
            edge_samples: config.edge_samples,
            goal_tolerance: config.goal_tolerance_cells,
        };
        match path::validate_and_refine(classifier, &simplified, bounds, &settings) {
            RefineOutcome::Valid {
                waypoints,
                nodes_visited,
            } => TierOutcome::Routed {
                waypoints,
                nodes_visited: search_nodes + nodes_visited,
            },
            RefineOutcome::Invalid { nodes_visited } => TierOutcome::Failed {
                nodes_visited: search_nodes + nodes_visited,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WaterClassification;
    use crate::source::{SourceError, SourceStats, WaterSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Synthetic map from a closure, counting every lookup.
    struct MapSource<F> {
        is_land: F,
        lookups: Arc<AtomicUsize>,
    }

    impl<F> WaterSource for MapSource<F>
    where
        F: Fn(GeoPoint) -> bool + Send,
    {
        fn classify(&self, point: GeoPoint) -> Option<WaterClassification> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Some(if (self.is_land)(point) {
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
                kind: "map".to_string(),
                resident_units: 1,
                capacity: 1,
                ready: true,
            }
        }
    }

    fn classifier_for<F>(is_land: F) -> (WaterClassifier, Arc<AtomicUsize>)
    where
        F: Fn(GeoPoint) -> bool + Send + 'static,
    {
        let lookups = Arc::new(AtomicUsize::new(0));
        let source = MapSource {
            is_land,
            lookups: lookups.clone(),
        };
        (WaterClassifier::new(Box::new(source), 1_000_000), lookups)
    }

    /// Wall of land across lon -0.01..0.01 with an optional east-west channel.
    fn walled(channel: Option<(f64, f64)>) -> impl Fn(GeoPoint) -> bool + Send + 'static {
        move |p: GeoPoint| {
            let in_wall = p.lon.abs() <= 0.01 && p.lat.abs() <= 1.0;
            let in_channel = channel.map_or(false, |(south, north)| p.lat > south && p.lat < north);
            in_wall && !in_channel
        }
    }

    fn planner(margin: f64) -> RoutePlanner {
        RoutePlanner::new(PlannerConfig {
            preload_margin_deg: margin,
            ..PlannerConfig::default()
        })
    }

    fn request(start: (f64, f64), end: (f64, f64), max_iterations: usize) -> RouteRequest {
        RouteRequest {
            start: GeoPoint::new(start.0, start.1),
            end: GeoPoint::new(end.0, end.1),
            max_iterations,
        }
    }

    #[test]
    fn tiers_start_from_distance_and_halve() {
        let planner = RoutePlanner::default();
        assert_eq!(planner.tiers(60.0), vec![0.02, 0.01, 0.005]);
        assert_eq!(planner.tiers(6.0), vec![0.005, 0.0025, 0.00125]);
        assert_eq!(planner.tiers(0.5), vec![0.001, 0.0005]);
    }

    #[test]
    fn open_water_is_a_direct_route() {
        let (mut classifier, _) = classifier_for(|_| false);
        let req = request((47.60, -122.35), (47.62, -122.33), 0);
        let result = RoutePlanner::default().find_route(&mut classifier, &req);

        assert!(result.success);
        assert_eq!(result.waypoints, vec![req.start, req.end]);
        assert!((result.distance_nm - req.start.distance_nm(&req.end)).abs() < 1e-9);
        assert!(!result.crosses_land());
        assert_eq!(result.tiers_tried, 0);
    }

    #[test]
    fn start_on_land_does_no_search() {
        let (mut classifier, lookups) = classifier_for(|p: GeoPoint| p.lon < 0.0);
        let req = request((0.0, -0.5), (0.0, 0.5), 0);
        let result = RoutePlanner::default().find_route(&mut classifier, &req);

        assert!(!result.success);
        assert_eq!(result.failure_reason, Some(FailureReason::StartOnLand));
        assert_eq!(result.waypoints, vec![req.start, req.end]);
        assert_eq!(result.nodes_visited, 0);
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn end_on_land_is_reported() {
        let (mut classifier, _) = classifier_for(|p: GeoPoint| p.lon > 0.0);
        let req = request((0.0, -0.5), (0.0, 0.5), 0);
        let result = RoutePlanner::default().find_route(&mut classifier, &req);
        assert_eq!(result.failure_reason, Some(FailureReason::EndOnLand));
    }

    #[test]
    fn long_blocked_route_is_not_searched() {
        let (mut classifier, _) = classifier_for(walled(None));
        let req = request((0.0, -2.0), (0.0, 2.0), 0);
        let result = planner(0.1).find_route(&mut classifier, &req);

        assert_eq!(result.failure_reason, Some(FailureReason::DistanceTooLong));
        assert_eq!(result.tiers_tried, 0);
        assert_eq!(result.waypoints.len(), 2);
    }

    #[test]
    fn coarse_tiers_fail_and_finer_tier_finds_channel() {
        let (mut classifier, _) = classifier_for(walled(Some((0.0011, 0.0019))));
        let req = request((0.02, -0.05), (0.02, 0.05), 0);
        let result = planner(0.05).find_route(&mut classifier, &req);

        assert!(result.success, "{:?}", result.failure_reason);
        assert_eq!(result.tiers_tried, 3);
        assert_eq!(result.grid_deg, Some(0.00125));
        assert!(result.crosses_land());
        assert_eq!(result.waypoints.first(), Some(&req.start));
        assert_eq!(result.waypoints.last(), Some(&req.end));
        for pair in result.waypoints.windows(2) {
            assert!(path::segment_is_water(&mut classifier, &pair[0], &pair[1], 11.0));
        }
        assert!(result.distance_nm > req.start.distance_nm(&req.end));
    }

    #[test]
    fn short_sealed_route_is_narrow_channel() {
        let (mut classifier, _) = classifier_for(walled(None));
        let req = request((0.02, -0.02), (0.02, 0.02), 0);
        let result = planner(0.02).find_route(&mut classifier, &req);

        assert!(!result.success);
        assert_eq!(result.failure_reason, Some(FailureReason::NarrowChannel));
        assert_eq!(result.tiers_tried, 3);
        assert_eq!(result.waypoints, vec![req.start, req.end]);
    }

    #[test]
    fn tiny_budget_is_max_iterations_exceeded() {
        let (mut classifier, _) = classifier_for(walled(Some((0.0011, 0.0019))));
        let req = request((0.02, -0.05), (0.02, 0.05), 10);
        let result = planner(0.05).find_route(&mut classifier, &req);

        assert_eq!(result.failure_reason, Some(FailureReason::MaxIterationsExceeded));
        assert_eq!(result.waypoints.len(), 2);
    }

    /// Open water whose data never loads.
    struct Unloadable;

    impl WaterSource for Unloadable {
        fn classify(&self, _point: GeoPoint) -> Option<WaterClassification> {
            Some(WaterClassification::Ocean)
        }

        fn preload(&mut self, _bounds: &BoundingBox) -> Result<usize, SourceError> {
            Err(SourceError::TooManyTiles {
                needed: 9,
                capacity: 2,
            })
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                kind: "unloadable".to_string(),
                resident_units: 0,
                capacity: 2,
                ready: false,
            }
        }
    }

    #[test]
    fn failed_preload_is_data_unavailable() {
        let mut classifier = WaterClassifier::new(Box::new(Unloadable), 1_000);
        let req = request((10.5, 20.5), (11.5, 21.5), 0);
        let result = RoutePlanner::default().find_route(&mut classifier, &req);

        assert!(!result.success);
        assert_eq!(result.failure_reason, Some(FailureReason::DataUnavailable));
        assert_eq!(result.waypoints, vec![req.start, req.end]);
        assert_eq!(classifier.stats().queries, 0);
    }

    #[test]
    fn unavailable_data_fails_closed() {
        let mut classifier = WaterClassifier::unavailable();
        let req = request((47.60, -122.35), (47.62, -122.33), 0);
        let result = RoutePlanner::default().find_route(&mut classifier, &req);
        assert_eq!(result.failure_reason, Some(FailureReason::StartOnLand));
    }
}
