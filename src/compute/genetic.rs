//! Genetic operators over routes: selection, crossover, mutation, elitism.

use rand::prelude::*;
use rayon::prelude::*;

use crate::schema::{Coordinate, GeneticConfig};

use super::pathfinder::{connect, greedy_route};
use super::{Grid, Route};

/// Shortest random walk seeded into the initial population.
pub const MIN_RANDOM_ROUTE_LENGTH: usize = 20;
/// Draws per random-walk step while looking for a walkable neighbor.
const RANDOM_STEP_ATTEMPTS: usize = 10;
/// Insert mutation stops this close to the maximum route length.
const INSERT_HEADROOM: usize = 10;

/// Which crossover variant produced a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossoverKind {
    SinglePoint,
    TwoPoint,
    Uniform,
}

/// Which mutation variant was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    InsertRandom,
    SwapPositions,
    RemoveLoop,
    ReverseSegment,
}

/// Random number generator wrapper for route operations.
pub struct RouteRng {
    rng: StdRng,
}

impl RouteRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create with random seed.
    pub fn random() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Generate next u64 for seeding child RNGs.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.r#gen()
    }

    /// Underlying generator, for grid construction and other draws.
    pub fn inner(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Random walk of at most `max_len` coordinates from the start cell.
    ///
    /// Each step draws up to ten in-bounds neighbors looking for a walkable
    /// one and takes the last draw either way, so the walk can hit debris.
    pub fn random_route(&mut self, grid: &Grid, max_len: usize) -> Route {
        let mut route = Route::with_capacity(max_len);
        let mut current = grid.start();
        route.push(current);

        let mut neighbors = Vec::with_capacity(6);
        while route.len() < max_len {
            neighbors.clear();
            neighbors.extend(grid.neighbors(current));
            if neighbors.is_empty() {
                break;
            }

            let mut next = current;
            for _ in 0..RANDOM_STEP_ATTEMPTS {
                next = neighbors[self.rng.gen_range(0..neighbors.len())];
                if grid.is_walkable(next) {
                    break;
                }
            }
            route.push(next);
            current = next;
        }

        route.refresh_metrics(grid);
        route
    }

    /// Seed population: one tenth (at least one) greedy survivor-chasing
    /// routes, the rest random walks of random length.
    pub fn initial_population(&mut self, grid: &Grid, size: usize, max_len: usize) -> Vec<Route> {
        let greedy_count = (size / 10).max(1).min(size);
        let seeds: Vec<u64> = (greedy_count..size).map(|_| self.next_seed()).collect();

        let mut population = if greedy_count > 0 {
            vec![greedy_route(grid, max_len); greedy_count]
        } else {
            Vec::new()
        };

        let upper = (max_len / 2).max(MIN_RANDOM_ROUTE_LENGTH);
        let random: Vec<Route> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = RouteRng::new(seed);
                let len = rng
                    .rng
                    .gen_range(MIN_RANDOM_ROUTE_LENGTH..=upper)
                    .min(max_len.max(1));
                rng.random_route(grid, len)
            })
            .collect();
        population.extend(random);

        population
    }

    /// Tournament selection: draw `k` indices with replacement, keep the
    /// fittest. Ties keep the first drawn.
    ///
    /// A tournament as large as the population is the whole population, so
    /// it always yields the (first) fittest member.
    ///
    /// # Panics
    ///
    /// Panics if `routes` is empty.
    pub fn select_index(&mut self, routes: &[Route], k: usize) -> usize {
        if k >= routes.len() {
            return fittest_index(routes);
        }
        let mut best: Option<usize> = None;
        for _ in 0..k.max(1) {
            let idx = self.rng.gen_range(0..routes.len());
            if best.is_none_or(|b| routes[idx].fitness > routes[b].fitness) {
                best = Some(idx);
            }
        }
        best.unwrap_or(0)
    }

    /// Tournament selection returning the winning route.
    ///
    /// # Panics
    ///
    /// Panics if `routes` is empty.
    pub fn tournament_select<'a>(&mut self, routes: &'a [Route], k: usize) -> &'a Route {
        &routes[self.select_index(routes, k)]
    }

    /// Crossover using a uniformly chosen variant.
    pub fn crossover(&mut self, parent1: &Route, parent2: &Route, grid: &Grid) -> Route {
        self.crossover_with_kind(parent1, parent2, grid).0
    }

    /// Crossover using a uniformly chosen variant, reporting which one ran.
    pub fn crossover_with_kind(
        &mut self,
        parent1: &Route,
        parent2: &Route,
        grid: &Grid,
    ) -> (Route, CrossoverKind) {
        match self.rng.gen_range(0..3) {
            0 => (
                self.single_point_crossover(parent1, parent2, grid),
                CrossoverKind::SinglePoint,
            ),
            1 => (
                self.two_point_crossover(parent1, parent2, grid),
                CrossoverKind::TwoPoint,
            ),
            _ => (
                self.uniform_crossover(parent1, parent2),
                CrossoverKind::Uniform,
            ),
        }
    }

    /// Prefix of `parent1` up to a random cut, then the suffix of `parent2`
    /// from its own random cut, bridged by a connecting path when the two
    /// halves do not touch.
    pub fn single_point_crossover(
        &mut self,
        parent1: &Route,
        parent2: &Route,
        grid: &Grid,
    ) -> Route {
        let (a, b) = (parent1.coordinates(), parent2.coordinates());
        if a.len() < 2 || b.len() < 2 {
            return parent1.clone();
        }

        let cut1 = self.rng.gen_range(1..a.len());
        let cut2 = self.rng.gen_range(1..b.len());

        let mut child = Vec::with_capacity(cut1 + b.len() - cut2);
        child.extend_from_slice(&a[..cut1]);
        splice(&mut child, &b[cut2..], grid);

        finish_child(child, parent1)
    }

    /// Middle segment of `parent2` placed between a prefix and a suffix of
    /// `parent1`, with both joins repaired.
    pub fn two_point_crossover(&mut self, parent1: &Route, parent2: &Route, grid: &Grid) -> Route {
        let (a, b) = (parent1.coordinates(), parent2.coordinates());
        if a.len() < 3 || b.len() < 3 {
            return self.single_point_crossover(parent1, parent2, grid);
        }

        let (start1, end1) = self.cut_range(a.len());
        let (start2, end2) = self.cut_range(b.len());

        let mut child = Vec::with_capacity(start1 + (end2 - start2) + (a.len() - end1));
        child.extend_from_slice(&a[..start1]);
        splice(&mut child, &b[start2..end2], grid);
        splice(&mut child, &a[end1..], grid);

        finish_child(child, parent1)
    }

    /// `start` in `[0, len/2]`, `end` in `[start + 1, len - 1]`. Needs `len >= 3`.
    fn cut_range(&mut self, len: usize) -> (usize, usize) {
        let start = self.rng.gen_range(0..=len / 2);
        let end = self.rng.gen_range(start + 1..len);
        (start, end)
    }

    /// Coin flip per index over the shorter parent, then the longer parent's
    /// tail. Joins are not repaired.
    pub fn uniform_crossover(&mut self, parent1: &Route, parent2: &Route) -> Route {
        let (a, b) = (parent1.coordinates(), parent2.coordinates());
        let shared = a.len().min(b.len());

        let mut child = Vec::with_capacity(a.len().max(b.len()));
        for i in 0..shared {
            child.push(if self.rng.gen_bool(0.5) { a[i] } else { b[i] });
        }
        let longer = if a.len() > b.len() { a } else { b };
        child.extend_from_slice(&longer[shared..]);

        finish_child(child, parent1)
    }

    /// Apply one uniformly chosen mutation with probability `rate`.
    ///
    /// Returns the variant that changed the route, or `None` when the roll
    /// failed or the route was too short for the chosen variant.
    pub fn mutate(
        &mut self,
        route: &mut Route,
        grid: &Grid,
        rate: f32,
        max_len: usize,
    ) -> Option<MutationKind> {
        if self.rng.r#gen::<f32>() >= rate {
            return None;
        }

        let coords = route.coordinates_mut();
        let (kind, applied) = match self.rng.gen_range(0..4) {
            0 => (
                MutationKind::InsertRandom,
                self.mutate_insert(coords, grid, max_len),
            ),
            1 => (MutationKind::SwapPositions, self.mutate_swap(coords)),
            2 => (MutationKind::RemoveLoop, mutate_remove_loop(coords)),
            _ => (MutationKind::ReverseSegment, self.mutate_reverse(coords)),
        };
        applied.then_some(kind)
    }

    /// Insert a random in-bounds neighbor of an interior position before it.
    fn mutate_insert(&mut self, coords: &mut Vec<Coordinate>, grid: &Grid, max_len: usize) -> bool {
        if coords.len() < 2 || coords.len() >= max_len.saturating_sub(INSERT_HEADROOM) {
            return false;
        }
        let pos = self.rng.gen_range(1..coords.len());
        let neighbors: Vec<Coordinate> = grid.neighbors(coords[pos]).collect();
        let Some(&next) = neighbors.choose(&mut self.rng) else {
            return false;
        };
        coords.insert(pos, next);
        true
    }

    /// Swap two distinct interior positions.
    fn mutate_swap(&mut self, coords: &mut [Coordinate]) -> bool {
        let len = coords.len();
        if len < 4 {
            return false;
        }
        let i = self.rng.gen_range(1..len - 2);
        let j = self.rng.gen_range(i + 1..len - 1);
        coords.swap(i, j);
        true
    }

    /// Reverse a random interior sub-range. Endpoints stay put.
    fn mutate_reverse(&mut self, coords: &mut [Coordinate]) -> bool {
        let len = coords.len();
        if len < 4 {
            return false;
        }
        let start = self.rng.gen_range(1..len - 2);
        let end = self.rng.gen_range(start + 1..len - 1);
        coords[start..=end].reverse();
        true
    }

    /// Breed the next generation from a population sorted best first.
    ///
    /// Elites are cloned first; the rest are children of two tournament
    /// winners, crossed over with probability `crossover_rate` (otherwise a
    /// clone of the first parent) and then mutated.
    pub fn next_generation(
        &mut self,
        population: &[Route],
        grid: &Grid,
        config: &GeneticConfig,
    ) -> Vec<Route> {
        let target = config.population_size;
        let mut next = apply_elitism(population, config.elitism_count());
        next.truncate(target);
        next.reserve(target.saturating_sub(next.len()));

        if population.is_empty() {
            return next;
        }

        while next.len() < target {
            let parent1 = self.tournament_select(population, config.tournament_size);
            let parent2 = self.tournament_select(population, config.tournament_size);

            let mut child = if self.rng.r#gen::<f32>() < config.crossover_rate {
                self.crossover(parent1, parent2, grid)
            } else {
                parent1.clone()
            };
            self.mutate(
                &mut child,
                grid,
                config.mutation_rate,
                config.max_route_length,
            );
            next.push(child);
        }

        next
    }
}

fn fittest_index(routes: &[Route]) -> usize {
    let mut best = 0;
    for (i, r) in routes.iter().enumerate().skip(1) {
        if r.fitness > routes[best].fitness {
            best = i;
        }
    }
    best
}

/// Remove the first revisit loop: everything after `i` up to and including
/// `j`, where `j >= i + 2` is the first later index holding the same cell.
fn mutate_remove_loop(coords: &mut Vec<Coordinate>) -> bool {
    let len = coords.len();
    if len < 3 {
        return false;
    }
    for i in 0..len - 2 {
        if let Some(offset) = coords[i + 2..].iter().position(|c| *c == coords[i]) {
            let j = i + 2 + offset;
            coords.drain(i + 1..=j);
            return true;
        }
    }
    false
}

/// Append `tail` to `child`, bridging a non-adjacent join with a connecting
/// path (endpoints dropped). A repeated join cell is written once.
/// Unbridgeable joins are left as they are.
fn splice(child: &mut Vec<Coordinate>, tail: &[Coordinate], grid: &Grid) {
    let (Some(&last), Some(&first)) = (child.last(), tail.first()) else {
        child.extend_from_slice(tail);
        return;
    };

    if last == first {
        child.extend_from_slice(&tail[1..]);
        return;
    }

    if !last.is_adjacent(first)
        && let Some(bridge) = connect(grid, last, first)
    {
        let inner = bridge.coordinates();
        if inner.len() > 2 {
            child.extend_from_slice(&inner[1..inner.len() - 1]);
        }
    }
    child.extend_from_slice(tail);
}

/// Wrap crossover output, falling back to the first parent when too short.
fn finish_child(coords: Vec<Coordinate>, parent1: &Route) -> Route {
    if coords.len() < 2 {
        return parent1.clone();
    }
    Route::from_coordinates(coords)
}

/// Clone the best `count` routes of a population sorted best first.
///
/// `count` is clamped to at least one and at most half the population.
pub fn apply_elitism(population: &[Route], count: usize) -> Vec<Route> {
    let limit = (population.len() / 2).max(1).min(population.len());
    let count = count.max(1).min(limit);
    population[..count].to_vec()
}
