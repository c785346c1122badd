//! A* pathfinding on the 6-connected grid and survivor-chasing route builders.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::schema::Coordinate;

use super::{Grid, Route};

/// Base g-cost of a single move.
pub const STEP_COST: f32 = 1.0;
/// Extra g-cost for stepping onto debris.
///
/// Neighbors are filtered to walkable cells before costing, so this only
/// applies through [`step_cost`] when called directly.
pub const OBSTACLE_PENALTY: f32 = 10.0;

/// Grids at least this large keep a discovery margin below the cell count.
const SEARCH_MARGIN_MIN_CELLS: usize = 1000;
const SEARCH_MARGIN: usize = 100;

/// Cost of moving onto `to`.
#[inline]
pub fn step_cost(grid: &Grid, to: Coordinate) -> f32 {
    if grid.is_obstacle(to) {
        STEP_COST + OBSTACLE_PENALTY
    } else {
        STEP_COST
    }
}

/// Most nodes a single search may discover before giving up.
fn discovery_budget(grid: &Grid) -> usize {
    let total = grid.total_cells();
    if total > SEARCH_MARGIN_MIN_CELLS {
        total - SEARCH_MARGIN
    } else {
        total
    }
}

struct Node {
    coord: Coordinate,
    g: f32,
    f: f32,
    parent: Option<usize>,
    closed: bool,
}

/// Open-set entry. Lowest `f` pops first; equal `f` pops in discovery order.
#[derive(PartialEq)]
struct OpenEntry {
    f: f32,
    seq: u64,
    node: usize,
}

impl Eq for OpenEntry {}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Find a path from `start` to `goal`.
///
/// Returns `None` when either endpoint is out of bounds, when `goal` is
/// debris, when the goal is unreachable, or when the search exhausts its
/// discovery budget. The heuristic overweights vertical distance, so the
/// path is not guaranteed to be the shortest.
///
/// The returned route starts at `start`, ends at `goal`, and every step is
/// face-adjacent. Its `collision_count` is filled in.
pub fn find_path(grid: &Grid, start: Coordinate, goal: Coordinate) -> Option<Route> {
    if !grid.in_bounds(start) || !grid.in_bounds(goal) {
        return None;
    }
    if grid.is_obstacle(goal) && !grid.is_survivor(goal) {
        return None;
    }

    let budget = discovery_budget(grid);
    let mut nodes: Vec<Node> = Vec::new();
    let mut index: HashMap<Coordinate, usize> = HashMap::new();
    let mut open = BinaryHeap::new();
    let mut seq = 0u64;

    let h = start.heuristic(goal);
    nodes.push(Node {
        coord: start,
        g: 0.0,
        f: h,
        parent: None,
        closed: false,
    });
    index.insert(start, 0);
    open.push(OpenEntry { f: h, seq, node: 0 });

    while let Some(OpenEntry { node: current, .. }) = open.pop() {
        if nodes[current].closed {
            continue;
        }
        nodes[current].closed = true;

        let coord = nodes[current].coord;
        if coord == goal {
            return Some(reconstruct(grid, &nodes, current));
        }

        let g_current = nodes[current].g;
        for neighbor in grid.walkable_neighbors(coord) {
            let g = g_current + step_cost(grid, neighbor);

            match index.get(&neighbor) {
                Some(&i) if nodes[i].closed => {}
                Some(&i) => {
                    if g < nodes[i].g {
                        let node = &mut nodes[i];
                        node.g = g;
                        node.f = g + neighbor.heuristic(goal);
                        node.parent = Some(current);
                        seq += 1;
                        open.push(OpenEntry {
                            f: node.f,
                            seq,
                            node: i,
                        });
                    }
                }
                None => {
                    let f = g + neighbor.heuristic(goal);
                    let i = nodes.len();
                    nodes.push(Node {
                        coord: neighbor,
                        g,
                        f,
                        parent: Some(current),
                        closed: false,
                    });
                    index.insert(neighbor, i);
                    seq += 1;
                    open.push(OpenEntry { f, seq, node: i });

                    if nodes.len() > budget {
                        log::warn!(
                            "Pathfinding from {start} to {goal} exceeded {budget} discovered nodes"
                        );
                        return None;
                    }
                }
            }
        }
    }

    None
}

fn reconstruct(grid: &Grid, nodes: &[Node], goal: usize) -> Route {
    let mut coords = Vec::new();
    let mut cursor = Some(goal);
    while let Some(i) = cursor {
        coords.push(nodes[i].coord);
        cursor = nodes[i].parent;
    }
    coords.reverse();

    let mut route = Route::from_coordinates(coords);
    route.collision_count = route.count_collisions(grid);
    route
}

/// Bridge two coordinates that are not adjacent.
#[inline]
pub fn connect(grid: &Grid, from: Coordinate, to: Coordinate) -> Option<Route> {
    find_path(grid, from, to)
}

/// Index of the unvisited survivor closest to `from` in straight-line distance.
pub fn nearest_unvisited_survivor(
    grid: &Grid,
    from: Coordinate,
    visited: &[bool],
) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, s) in grid.survivors().iter().enumerate() {
        if visited.get(i).copied().unwrap_or(false) {
            continue;
        }
        let d = from.euclidean_distance(*s);
        if best.is_none_or(|(_, best_d)| d < best_d) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

/// Path to the nearest unvisited survivor, with that survivor's index.
///
/// `None` when every survivor is visited or the nearest one is unreachable.
pub fn nearest_survivor_path(
    grid: &Grid,
    from: Coordinate,
    visited: &[bool],
) -> Option<(usize, Route)> {
    let target = nearest_unvisited_survivor(grid, from, visited)?;
    let goal = grid.survivor_position(target)?;
    find_path(grid, from, goal).map(|route| (target, route))
}

/// Chain nearest-survivor paths from the start cell.
///
/// Stops when every survivor has been visited or skipped, or once the route
/// is longer than `max_len`. Unreachable survivors are skipped.
pub fn greedy_route(grid: &Grid, max_len: usize) -> Route {
    let mut route = Route::default();
    let mut current = grid.start();
    route.push(current);

    let mut visited = vec![false; grid.survivor_count()];
    while let Some(target) = nearest_unvisited_survivor(grid, current, &visited) {
        visited[target] = true;

        let Some(goal) = grid.survivor_position(target) else {
            continue;
        };
        let Some(segment) = find_path(grid, current, goal) else {
            log::debug!("Survivor {target} at {goal} unreachable from {current}, skipping");
            continue;
        };

        route.extend_from_slice(&segment.coordinates()[1..]);
        current = goal;

        // Segments can pass over other survivors on the way.
        for c in segment.coordinates() {
            if let Some(i) = grid.survivor_at(*c) {
                visited[i] = true;
            }
        }

        if route.len() > max_len {
            break;
        }
    }

    route.refresh_metrics(grid);
    route
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::CellType;
    use proptest::prelude::*;

    fn open_grid(w: usize, h: usize, d: usize) -> Grid {
        Grid::new(w, h, d).unwrap()
    }

    fn assert_valid_path(route: &Route, start: Coordinate, goal: Coordinate) {
        assert_eq!(route.first(), Some(start));
        assert_eq!(route.last(), Some(goal));
        assert!(route.is_connected());
    }

    #[test]
    fn test_corner_to_corner() {
        let mut grid = open_grid(5, 5, 5);
        let goal = Coordinate::new(4, 4, 4);
        grid.add_survivor(goal);

        let route = find_path(&grid, Coordinate::ORIGIN, goal).unwrap();

        assert_valid_path(&route, Coordinate::ORIGIN, goal);
        assert_eq!(route.len(), 13);
        assert_eq!(route.collision_count, 0);
    }

    #[test]
    fn test_start_equals_goal() {
        let grid = open_grid(3, 3, 1);
        let route = find_path(&grid, Coordinate::ORIGIN, Coordinate::ORIGIN).unwrap();
        assert_eq!(route.coordinates(), &[Coordinate::ORIGIN]);
    }

    #[test]
    fn test_rejects_invalid_endpoints() {
        let mut grid = open_grid(4, 4, 2);
        grid.set_cell(Coordinate::new(3, 3, 1), CellType::Obstacle);

        assert!(find_path(&grid, Coordinate::ORIGIN, Coordinate::new(3, 3, 1)).is_none());
        assert!(find_path(&grid, Coordinate::ORIGIN, Coordinate::new(4, 0, 0)).is_none());
        assert!(find_path(&grid, Coordinate::new(0, -1, 0), Coordinate::new(1, 1, 0)).is_none());
    }

    #[test]
    fn test_routes_around_wall() {
        // Wall across x = 2 on the only floor, with a gap at y = 4.
        let mut grid = open_grid(5, 5, 1);
        for y in 0..4 {
            grid.set_cell(Coordinate::new(2, y, 0), CellType::Obstacle);
        }
        let goal = Coordinate::new(4, 0, 0);

        let route = find_path(&grid, Coordinate::ORIGIN, goal).unwrap();

        assert_valid_path(&route, Coordinate::ORIGIN, goal);
        assert!(route.contains(Coordinate::new(2, 4, 0)));
        assert_eq!(route.collision_count, 0);
    }

    #[test]
    fn test_enclosed_goal_unreachable() {
        let mut grid = open_grid(3, 3, 1);
        grid.set_cell(Coordinate::new(1, 0, 0), CellType::Obstacle);
        grid.set_cell(Coordinate::new(0, 1, 0), CellType::Obstacle);
        assert!(connect(&grid, Coordinate::ORIGIN, Coordinate::new(2, 2, 0)).is_none());
    }

    #[test]
    fn test_step_cost_penalizes_debris() {
        let mut grid = open_grid(2, 1, 1);
        grid.set_cell(Coordinate::new(1, 0, 0), CellType::Obstacle);
        assert_eq!(step_cost(&grid, Coordinate::ORIGIN), STEP_COST);
        assert_eq!(
            step_cost(&grid, Coordinate::new(1, 0, 0)),
            STEP_COST + OBSTACLE_PENALTY
        );
    }

    #[test]
    fn test_nearest_survivor() {
        let mut grid = open_grid(6, 1, 1);
        grid.add_survivor(Coordinate::new(5, 0, 0));
        grid.add_survivor(Coordinate::new(2, 0, 0));

        let (idx, route) =
            nearest_survivor_path(&grid, Coordinate::ORIGIN, &[false, false]).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(route.len(), 3);

        let (idx, _) = nearest_survivor_path(&grid, Coordinate::ORIGIN, &[false, true]).unwrap();
        assert_eq!(idx, 0);
        assert!(nearest_survivor_path(&grid, Coordinate::ORIGIN, &[true, true]).is_none());
    }

    #[test]
    fn test_greedy_visits_all_survivors() {
        let mut grid = open_grid(6, 6, 2);
        for s in [(5, 5, 1), (2, 0, 0), (0, 4, 1)] {
            grid.add_survivor(s.into());
        }

        let route = greedy_route(&grid, 1000);

        assert_eq!(route.first(), Some(grid.start()));
        assert!(route.is_connected());
        assert_eq!(route.survivors_reached, 3);
        assert_eq!(route.collision_count, 0);
    }

    #[test]
    fn test_greedy_skips_unreachable() {
        let mut grid = open_grid(5, 5, 1);
        grid.add_survivor(Coordinate::new(1, 1, 0));
        grid.add_survivor(Coordinate::new(4, 4, 0));
        grid.add_survivor(Coordinate::new(0, 3, 0));
        // Seal off the far corner.
        grid.set_cell(Coordinate::new(3, 4, 0), CellType::Obstacle);
        grid.set_cell(Coordinate::new(4, 3, 0), CellType::Obstacle);

        let route = greedy_route(&grid, 1000);
        assert_eq!(route.survivors_reached, 2);
        assert!(route.contains(Coordinate::new(0, 3, 0)));
    }

    proptest! {
        #[test]
        fn prop_found_paths_are_connected(
            obstacles in prop::collection::vec((0i32..6, 0i32..6, 0i32..3), 0..40),
            goal in (0i32..6, 0i32..6, 0i32..3),
        ) {
            let mut grid = open_grid(6, 6, 3);
            for o in obstacles {
                if Coordinate::from(o) != Coordinate::ORIGIN {
                    grid.set_cell(o.into(), CellType::Obstacle);
                }
            }
            let goal = Coordinate::from(goal);

            if let Some(route) = find_path(&grid, Coordinate::ORIGIN, goal) {
                prop_assert_eq!(route.first(), Some(Coordinate::ORIGIN));
                prop_assert_eq!(route.last(), Some(goal));
                prop_assert!(route.is_connected());
                prop_assert_eq!(route.collision_count, 0);
            } else {
                prop_assert!(goal != Coordinate::ORIGIN);
            }
        }
    }
}
