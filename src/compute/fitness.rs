//! Route fitness: survivors reached, area covered, length and risk.

use crate::schema::{Coordinate, FitnessWeights, RescueConfig};

use super::route::{count_collisions, count_survivors};
use super::{Grid, Route};

/// Chebyshev radius the robot's sensors sweep around each route cell.
pub const COVERAGE_RADIUS: i32 = 2;
/// Risk per coordinate on debris.
pub const COLLISION_RISK: f32 = 10.0;
/// Risk per coordinate of route length.
pub const LENGTH_RISK: f32 = 0.1;
/// Risk per level of a move that climbs or drops more than one floor.
pub const VERTICAL_RISK: f32 = 2.0;

/// Raw and normalized fitness components of one route.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FitnessBreakdown {
    pub survivors_reached: usize,
    pub collision_count: usize,
    /// Share of grid cells within sensor range of the route, 0-100.
    pub coverage_percent: f32,
    pub length: usize,
    pub risk: f32,
    /// Survivors reached over survivors present.
    pub survivors_norm: f32,
    /// Coverage as a fraction.
    pub coverage_norm: f32,
    /// Length over the maximum route length. Not clamped.
    pub length_norm: f32,
    /// Risk over the maximum expected risk, clamped to [0, 1].
    pub risk_norm: f32,
    pub fitness: f32,
}

/// Weighted fitness function, fixed for the duration of a run.
#[derive(Debug, Clone)]
pub struct FitnessModel {
    weights: FitnessWeights,
    max_route_length: usize,
    max_expected_risk: f32,
}

impl FitnessModel {
    pub fn new(weights: FitnessWeights, max_route_length: usize) -> Self {
        let max_route_length = max_route_length.max(1);
        let max_expected_risk = weights
            .max_expected_risk
            .filter(|r| *r > 0.0)
            .unwrap_or((COLLISION_RISK + LENGTH_RISK) * max_route_length as f32);
        Self {
            weights,
            max_route_length,
            max_expected_risk,
        }
    }

    pub fn from_config(config: &RescueConfig) -> Self {
        Self::new(config.fitness.clone(), config.genetic.max_route_length)
    }

    pub fn weights(&self) -> &FitnessWeights {
        &self.weights
    }

    pub fn max_route_length(&self) -> usize {
        self.max_route_length
    }

    pub fn max_expected_risk(&self) -> f32 {
        self.max_expected_risk
    }

    /// Score a coordinate sequence.
    pub fn evaluate_coordinates(&self, coords: &[Coordinate], grid: &Grid) -> FitnessBreakdown {
        let survivors_reached = count_survivors(coords, grid);
        let collision_count = count_collisions(coords, grid);
        let coverage_percent = coverage_percent(coords, grid);
        let risk = route_risk(coords, collision_count);

        let survivors_norm = if grid.survivor_count() > 0 {
            survivors_reached as f32 / grid.survivor_count() as f32
        } else {
            0.0
        };
        let coverage_norm = coverage_percent / 100.0;
        let length_norm = coords.len() as f32 / self.max_route_length as f32;
        let risk_norm = (risk / self.max_expected_risk).clamp(0.0, 1.0);

        let w = &self.weights;
        let fitness = w.survivors * survivors_norm + w.coverage * coverage_norm
            - w.length * length_norm
            - w.risk * risk_norm;

        FitnessBreakdown {
            survivors_reached,
            collision_count,
            coverage_percent,
            length: coords.len(),
            risk,
            survivors_norm,
            coverage_norm,
            length_norm,
            risk_norm,
            fitness,
        }
    }

    /// Score a route and store the result and its metrics on it.
    pub fn score(&self, route: &mut Route, grid: &Grid) -> FitnessBreakdown {
        let breakdown = self.evaluate_coordinates(route.coordinates(), grid);
        route.survivors_reached = breakdown.survivors_reached;
        route.collision_count = breakdown.collision_count;
        route.fitness = breakdown.fitness;
        breakdown
    }

    /// Score every route on the calling thread.
    pub fn score_population(&self, routes: &mut [Route], grid: &Grid) {
        for route in routes {
            self.score(route, grid);
        }
    }
}

/// Percentage of grid cells within [`COVERAGE_RADIUS`] (Chebyshev) of any
/// route coordinate.
pub fn coverage_percent(coords: &[Coordinate], grid: &Grid) -> f32 {
    if coords.is_empty() {
        return 0.0;
    }

    let mut covered = vec![false; grid.total_cells()];
    let mut count = 0usize;
    let r = COVERAGE_RADIUS;
    for c in coords {
        for dz in -r..=r {
            for dy in -r..=r {
                for dx in -r..=r {
                    if let Some(i) = grid.index(c.offset((dx, dy, dz)))
                        && !covered[i]
                    {
                        covered[i] = true;
                        count += 1;
                    }
                }
            }
        }
    }

    count as f32 / grid.total_cells() as f32 * 100.0
}

/// Unnormalized risk of walking `coords`.
pub fn route_risk(coords: &[Coordinate], collision_count: usize) -> f32 {
    let vertical: f32 = coords
        .windows(2)
        .map(|w| w[0].z.abs_diff(w[1].z))
        .filter(|dz| *dz > 1)
        .map(|dz| dz as f32 * VERTICAL_RISK)
        .sum();
    collision_count as f32 * COLLISION_RISK + coords.len() as f32 * LENGTH_RISK + vertical
}

/// Fitness summary over a population.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PopulationStats {
    pub best: f32,
    pub average: f32,
    pub worst: f32,
    pub average_survivors: f32,
    pub average_length: f32,
}

impl PopulationStats {
    /// All zeros for an empty population.
    pub fn from_routes(routes: &[Route]) -> Self {
        if routes.is_empty() {
            return Self::default();
        }
        let n = routes.len() as f32;
        Self {
            best: best_fitness(routes),
            average: average_fitness(routes),
            worst: worst_fitness(routes),
            average_survivors: routes.iter().map(|r| r.survivors_reached as f32).sum::<f32>() / n,
            average_length: routes.iter().map(|r| r.len() as f32).sum::<f32>() / n,
        }
    }
}

pub fn best_fitness(routes: &[Route]) -> f32 {
    routes
        .iter()
        .map(|r| r.fitness)
        .max_by(f32::total_cmp)
        .unwrap_or(0.0)
}

pub fn worst_fitness(routes: &[Route]) -> f32 {
    routes
        .iter()
        .map(|r| r.fitness)
        .min_by(f32::total_cmp)
        .unwrap_or(0.0)
}

pub fn average_fitness(routes: &[Route]) -> f32 {
    if routes.is_empty() {
        return 0.0;
    }
    routes.iter().map(|r| r.fitness).sum::<f32>() / routes.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::CellType;
    use proptest::prelude::*;

    fn weights(survivors: f32, coverage: f32, length: f32, risk: f32) -> FitnessWeights {
        FitnessWeights {
            survivors,
            coverage,
            length,
            risk,
            max_expected_risk: None,
        }
    }

    #[test]
    fn test_coverage_whole_small_grid() {
        let grid = Grid::new(5, 5, 5).unwrap();
        let coverage = coverage_percent(&[Coordinate::new(2, 2, 2)], &grid);
        assert!((coverage - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_coverage_corner() {
        let grid = Grid::new(10, 10, 10).unwrap();
        // 3x3x3 cube in the corner.
        let coverage = coverage_percent(&[Coordinate::ORIGIN], &grid);
        assert!((coverage - 2.7).abs() < 1e-4);
        assert_eq!(coverage_percent(&[], &grid), 0.0);
    }

    #[test]
    fn test_risk_components() {
        let coords = [
            Coordinate::new(0, 0, 0),
            Coordinate::new(0, 0, 1),
            Coordinate::new(0, 0, 4),
            Coordinate::new(0, 0, 1),
        ];
        // 3 collisions, 4 cells, two jumps of 3 floors.
        let risk = route_risk(&coords, 3);
        assert!((risk - (30.0 + 0.4 + 12.0)).abs() < 1e-4);
    }

    #[test]
    fn test_fitness_formula() {
        let mut grid = Grid::new(10, 1, 1).unwrap();
        grid.add_survivor(Coordinate::new(2, 0, 0));
        grid.add_survivor(Coordinate::new(9, 0, 0));
        grid.set_cell(Coordinate::new(1, 0, 0), CellType::Obstacle);

        let model = FitnessModel::new(weights(10.0, 4.0, 2.0, 1.0), 100);
        let mut route = Route::from_coordinates(
            (0..3).map(|x| Coordinate::new(x, 0, 0)).collect(),
        );
        let b = model.score(&mut route, &grid);

        assert_eq!(b.survivors_reached, 1);
        assert_eq!(b.collision_count, 1);
        // x in 0..=4 covered.
        assert!((b.coverage_percent - 50.0).abs() < 1e-4);
        let risk_norm = (10.0 + 0.3) / (10.1 * 100.0);
        let expected = 10.0 * 0.5 + 4.0 * 0.5 - 2.0 * 0.03 - risk_norm;
        assert!((b.fitness - expected).abs() < 1e-5);
        assert_eq!(route.fitness, b.fitness);
        assert_eq!(route.collision_count, 1);
    }

    #[test]
    fn test_no_survivors_scores_zero_component() {
        let grid = Grid::new(3, 3, 1).unwrap();
        let model = FitnessModel::new(weights(1.0, 0.0, 0.0, 0.0), 10);
        let b = model.evaluate_coordinates(&[Coordinate::ORIGIN], &grid);
        assert_eq!(b.survivors_norm, 0.0);
        assert_eq!(b.fitness, 0.0);
    }

    #[test]
    fn test_fitness_can_be_negative() {
        let mut grid = Grid::new(4, 1, 1).unwrap();
        grid.set_cell(Coordinate::new(1, 0, 0), CellType::Obstacle);
        let model = FitnessModel::new(
            FitnessWeights {
                max_expected_risk: Some(5.0),
                ..weights(0.0, 0.0, 1.0, 1.0)
            },
            2,
        );
        let coords: Vec<_> = (0..4).map(|x| Coordinate::new(x, 0, 0)).collect();
        let b = model.evaluate_coordinates(&coords, &grid);
        assert_eq!(b.risk_norm, 1.0);
        assert!((b.length_norm - 2.0).abs() < 1e-6);
        assert!((b.fitness + 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_population_stats() {
        let routes: Vec<Route> = [(2.0, 1, 3), (-1.0, 0, 5), (5.0, 2, 4)]
            .into_iter()
            .map(|(f, s, len)| {
                let mut r = Route::from_coordinates(vec![Coordinate::ORIGIN; len]);
                r.fitness = f;
                r.survivors_reached = s;
                r
            })
            .collect();

        let stats = PopulationStats::from_routes(&routes);
        assert_eq!(stats.best, 5.0);
        assert_eq!(stats.worst, -1.0);
        assert!((stats.average - 2.0).abs() < 1e-6);
        assert!((stats.average_survivors - 1.0).abs() < 1e-6);
        assert!((stats.average_length - 4.0).abs() < 1e-6);
        assert_eq!(PopulationStats::from_routes(&[]), PopulationStats::default());
    }

    proptest! {
        #[test]
        fn prop_components_in_range(
            coords in prop::collection::vec((-2i32..10, -2i32..10, -2i32..6), 0..60),
            obstacles in prop::collection::vec((0i32..8, 0i32..8, 0i32..4), 0..30),
        ) {
            let mut grid = Grid::new(8, 8, 4).unwrap();
            for o in obstacles {
                grid.set_cell(o.into(), CellType::Obstacle);
            }
            let coords: Vec<Coordinate> = coords.into_iter().map(Coordinate::from).collect();
            let model = FitnessModel::new(FitnessWeights::default(), 50);
            let b = model.evaluate_coordinates(&coords, &grid);

            prop_assert!((0.0..=100.0).contains(&b.coverage_percent));
            prop_assert!((0.0..=1.0).contains(&b.risk_norm));
        }
    }
}
