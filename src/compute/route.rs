//! Candidate rescue routes.

use std::collections::HashSet;

use crate::schema::{Coordinate, RouteSnapshot};

use super::Grid;

/// Capacity used when none is requested.
pub const DEFAULT_ROUTE_CAPACITY: usize = 100;

/// An ordered walk through the grid plus the metrics derived from it.
///
/// Nothing is checked on construction: a route may leave the grid, step onto
/// debris or jump between non-adjacent cells. The derived metrics are only as
/// fresh as the last call to [`Route::refresh_metrics`] or a fitness
/// evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    coordinates: Vec<Coordinate>,
    /// Distinct survivors visited.
    pub survivors_reached: usize,
    /// Coordinates lying on debris.
    pub collision_count: usize,
    /// Fitness score.
    pub fitness: f32,
}

impl Default for Route {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ROUTE_CAPACITY)
    }
}

impl Route {
    /// Empty route with room for `capacity` coordinates before reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_ROUTE_CAPACITY
        } else {
            capacity
        };
        Self {
            coordinates: Vec::with_capacity(capacity),
            survivors_reached: 0,
            collision_count: 0,
            fitness: 0.0,
        }
    }

    /// Route over the given coordinates with zeroed metrics.
    pub fn from_coordinates(coordinates: Vec<Coordinate>) -> Self {
        Self {
            coordinates,
            survivors_reached: 0,
            collision_count: 0,
            fitness: 0.0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.coordinates.capacity()
    }

    #[inline]
    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    /// Mutable access to the coordinate sequence for in-place operators.
    #[inline]
    pub fn coordinates_mut(&mut self) -> &mut Vec<Coordinate> {
        &mut self.coordinates
    }

    pub fn first(&self) -> Option<Coordinate> {
        self.coordinates.first().copied()
    }

    pub fn last(&self) -> Option<Coordinate> {
        self.coordinates.last().copied()
    }

    /// Append a coordinate. Capacity doubles when full.
    pub fn push(&mut self, coord: Coordinate) {
        if self.coordinates.len() == self.coordinates.capacity() {
            self.coordinates.reserve_exact(self.coordinates.capacity().max(1));
        }
        self.coordinates.push(coord);
    }

    pub fn extend_from_slice(&mut self, coords: &[Coordinate]) {
        for c in coords {
            self.push(*c);
        }
    }

    /// Remove the last coordinate.
    pub fn pop(&mut self) -> Option<Coordinate> {
        self.coordinates.pop()
    }

    /// Shorten to `len` coordinates. Capacity is kept.
    pub fn truncate(&mut self, len: usize) {
        self.coordinates.truncate(len);
    }

    /// Drop all coordinates and reset the metrics. Capacity is kept.
    pub fn clear(&mut self) {
        self.coordinates.clear();
        self.survivors_reached = 0;
        self.collision_count = 0;
        self.fitness = 0.0;
    }

    pub fn contains(&self, coord: Coordinate) -> bool {
        self.coordinates.contains(&coord)
    }

    /// Every coordinate lies inside the grid. Empty routes are not valid.
    pub fn is_within_bounds(&self, grid: &Grid) -> bool {
        !self.is_empty() && self.coordinates.iter().all(|c| grid.in_bounds(*c))
    }

    /// Every consecutive pair is face-adjacent.
    pub fn is_connected(&self) -> bool {
        self.coordinates.windows(2).all(|w| w[0].is_adjacent(w[1]))
    }

    /// Coordinates lying on debris (out-of-bounds counts as debris).
    pub fn count_collisions(&self, grid: &Grid) -> usize {
        count_collisions(&self.coordinates, grid)
    }

    /// Distinct survivors visited, regardless of order or repeats.
    pub fn count_survivors(&self, grid: &Grid) -> usize {
        count_survivors(&self.coordinates, grid)
    }

    /// Recompute `collision_count` and `survivors_reached`.
    pub fn refresh_metrics(&mut self, grid: &Grid) {
        self.collision_count = self.count_collisions(grid);
        self.survivors_reached = self.count_survivors(grid);
    }

    pub fn euclidean_length(&self) -> f32 {
        self.coordinates
            .windows(2)
            .map(|w| w[0].euclidean_distance(w[1]))
            .sum()
    }

    pub fn manhattan_length(&self) -> u32 {
        self.coordinates
            .windows(2)
            .map(|w| w[0].manhattan_distance(w[1]))
            .sum()
    }

    /// Convert to snapshot for serialization.
    pub fn to_snapshot(&self, coverage_percent: f32) -> RouteSnapshot {
        RouteSnapshot {
            fitness: self.fitness,
            survivors_reached: self.survivors_reached,
            collision_count: self.collision_count,
            coverage_percent,
            coordinates: self.coordinates.clone(),
        }
    }
}

pub(crate) fn count_collisions(coords: &[Coordinate], grid: &Grid) -> usize {
    coords.iter().filter(|c| grid.is_obstacle(**c)).count()
}

pub(crate) fn count_survivors(coords: &[Coordinate], grid: &Grid) -> usize {
    let mut found = HashSet::new();
    for c in coords {
        if let Some(idx) = grid.survivor_at(*c) {
            found.insert(idx);
        }
    }
    found.len()
}

/// Sort routes by fitness, best first.
pub fn sort_by_fitness(routes: &mut [Route]) {
    routes.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
}
