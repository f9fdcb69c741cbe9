//! A* over an 8-connected grid with water-only edges.

use super::grid::{Grid, GridCell};
use crate::classifier::WaterClassifier;
use crate::geo::{BoundingBox, GeoPoint};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

const NEIGHBORS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    pub max_iterations: usize,
    /// Intermediate points checked along every edge, excluding both ends.
    pub edge_samples: usize,
    /// Success once the current cell is this close to the goal cell.
    pub goal_tolerance: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Cells from start to the cell that reached the goal tolerance.
    Found {
        cells: Vec<GridCell>,
        nodes_visited: usize,
    },
    Exhausted {
        nodes_visited: usize,
    },
    Unreachable {
        nodes_visited: usize,
    },
}

impl SearchOutcome {
    pub fn nodes_visited(&self) -> usize {
        match self {
            SearchOutcome::Found { nodes_visited, .. }
            | SearchOutcome::Exhausted { nodes_visited }
            | SearchOutcome::Unreachable { nodes_visited } => *nodes_visited,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FloatOrd(f64);

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Open-set entry. The parent lives in the `came_from` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SearchNode {
    cell: GridCell,
    g: FloatOrd,
    f: FloatOrd,
}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f
            .cmp(&other.f)
            .then_with(|| other.g.cmp(&self.g))
            .then_with(|| self.cell.cmp(&other.cell))
    }
}

/// Run one A* pass. Node tables are local and dropped on return.
///
/// Haversine meters serve as both edge cost and heuristic. A neighbour is only
/// expanded when its cell and `edge_samples` points on the edge to it are water
/// and it lies inside `bounds`.
pub fn search(
    classifier: &mut WaterClassifier,
    grid: &Grid,
    start: GridCell,
    goal: GridCell,
    bounds: &BoundingBox,
    limits: &SearchLimits,
) -> SearchOutcome {
    let goal_point = grid.point(goal);
    let start_point = grid.point(start);

    let mut open_set: BinaryHeap<Reverse<SearchNode>> = BinaryHeap::new();
    let mut closed_set: HashSet<GridCell> = HashSet::new();
    let mut g_score: HashMap<GridCell, f64> = HashMap::new();
    let mut came_from: HashMap<GridCell, GridCell> = HashMap::new();

    g_score.insert(start, 0.0);
    open_set.push(Reverse(SearchNode {
        cell: start,
        g: FloatOrd(0.0),
        f: FloatOrd(start_point.distance_m(&goal_point)),
    }));

    let mut nodes_visited = 0usize;

    while let Some(Reverse(current)) = open_set.pop() {
        if closed_set.contains(&current.cell) {
            continue;
        }
        let best_g = g_score.get(&current.cell).copied().unwrap_or(f64::INFINITY);
        if current.g.0 > best_g + 1e-9 {
            continue;
        }
        if nodes_visited >= limits.max_iterations {
            return SearchOutcome::Exhausted { nodes_visited };
        }
        nodes_visited += 1;

        if current.cell.chebyshev(&goal) <= limits.goal_tolerance {
            return SearchOutcome::Found {
                cells: reconstruct(&came_from, current.cell),
                nodes_visited,
            };
        }

        closed_set.insert(current.cell);
        let current_point = grid.point(current.cell);

        for (d_lat, d_lon) in NEIGHBORS {
            let next = current.cell.offset(d_lat, d_lon);
            if closed_set.contains(&next) {
                continue;
            }
            let next_point = grid.point(next);
            if !bounds.contains(&next_point) {
                continue;
            }
            if !edge_is_water(classifier, &current_point, &next_point, limits.edge_samples) {
                continue;
            }

            let tentative_g = best_g + current_point.distance_m(&next_point);
            if tentative_g < g_score.get(&next).copied().unwrap_or(f64::INFINITY) {
                came_from.insert(next, current.cell);
                g_score.insert(next, tentative_g);
                open_set.push(Reverse(SearchNode {
                    cell: next,
                    g: FloatOrd(tentative_g),
                    f: FloatOrd(tentative_g + next_point.distance_m(&goal_point)),
                }));
            }
        }
    }

    SearchOutcome::Unreachable { nodes_visited }
}

/// The far cell first, then the intermediate points nearest to it.
fn edge_is_water(
    classifier: &mut WaterClassifier,
    from: &GeoPoint,
    to: &GeoPoint,
    samples: usize,
) -> bool {
    if !classifier.is_water(*to) {
        return false;
    }
    let divisions = samples + 1;
    (1..divisions)
        .rev()
        .all(|k| classifier.is_water(from.lerp(to, k as f64 / divisions as f64)))
}

fn reconstruct(came_from: &HashMap<GridCell, GridCell>, last: GridCell) -> Vec<GridCell> {
    let mut cells = vec![last];
    let mut current = last;
    while let Some(parent) = came_from.get(&current) {
        cells.push(*parent);
        current = *parent;
    }
    cells.reverse();
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WaterClassification;
    use crate::source::{SourceError, SourceStats, WaterSource};

    /// Open water with a north-south wall at longitude 0 between latitudes
    /// -0.01 and 0.01.
    struct Wall;

    impl WaterSource for Wall {
        fn classify(&self, point: GeoPoint) -> Option<WaterClassification> {
            let blocked = point.lon.abs() <= 0.0015 && point.lat.abs() <= 0.01;
            Some(if blocked {
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
                kind: "wall".to_string(),
                resident_units: 1,
                capacity: 1,
                ready: true,
            }
        }
    }

    fn limits(max_iterations: usize) -> SearchLimits {
        SearchLimits {
            max_iterations,
            edge_samples: 4,
            goal_tolerance: 0,
        }
    }

    #[test]
    fn routes_around_wall() {
        let mut classifier = WaterClassifier::new(Box::new(Wall), 10_000);
        let start = GeoPoint::new(0.0, -0.01);
        let grid = Grid::new(start, 0.002);
        let goal = grid.cell_of(GeoPoint::new(0.0, 0.01));
        let bounds = BoundingBox::new(-0.05, -0.05, 0.05, 0.05);

        let outcome = search(
            &mut classifier,
            &grid,
            grid.cell_of(start),
            goal,
            &bounds,
            &limits(10_000),
        );
        let SearchOutcome::Found { cells, .. } = outcome else {
            panic!("expected a path, got {outcome:?}");
        };
        assert_eq!(cells.first(), Some(&GridCell { lat: 0, lon: 0 }));
        assert_eq!(cells.last(), Some(&goal));
        assert!(cells.iter().any(|cell| grid.point(*cell).lat.abs() > 0.01));
        for pair in cells.windows(2) {
            assert_eq!(pair[0].chebyshev(&pair[1]), 1);
        }
    }

    #[test]
    fn iteration_budget_is_enforced() {
        let mut classifier = WaterClassifier::new(Box::new(Wall), 10_000);
        let start = GeoPoint::new(0.0, -0.01);
        let grid = Grid::new(start, 0.002);
        let goal = grid.cell_of(GeoPoint::new(0.0, 0.01));
        let bounds = BoundingBox::new(-0.05, -0.05, 0.05, 0.05);

        let outcome = search(
            &mut classifier,
            &grid,
            GridCell { lat: 0, lon: 0 },
            goal,
            &bounds,
            &limits(3),
        );
        assert_eq!(outcome, SearchOutcome::Exhausted { nodes_visited: 3 });
    }

    #[test]
    fn sealed_start_is_unreachable() {
        let mut classifier = WaterClassifier::new(Box::new(Wall), 10_000);
        let start = GeoPoint::new(0.0, -0.01);
        let grid = Grid::new(start, 0.002);
        // goal lies outside the box, so the search runs dry
        let bounds = BoundingBox::new(-0.005, -0.02, 0.005, -0.0016);
        let goal = grid.cell_of(GeoPoint::new(0.0, 0.01));

        let outcome = search(
            &mut classifier,
            &grid,
            GridCell { lat: 0, lon: 0 },
            goal,
            &bounds,
            &limits(10_000),
        );
        assert!(matches!(outcome, SearchOutcome::Unreachable { .. }), "{outcome:?}");
    }
}
