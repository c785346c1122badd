//! Serializable records describing an evolution run.

use serde::{Deserialize, Serialize};

use super::Coordinate;

/// Frozen copy of a scored route, for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    /// Fitness score.
    pub fitness: f32,
    /// Distinct survivors visited.
    pub survivors_reached: usize,
    /// Coordinates lying on obstacle cells.
    pub collision_count: usize,
    /// Coverage of the grid, in percent.
    pub coverage_percent: f32,
    /// Route coordinates from the start cell onward.
    pub coordinates: Vec<Coordinate>,
}

/// Summary of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Generation number (0 is the initial population).
    pub generation: usize,
    pub best_fitness: f32,
    pub average_fitness: f32,
    pub worst_fitness: f32,
    pub average_survivors: f32,
    pub average_length: f32,
    /// Survivors reached by the best route.
    pub best_survivors: usize,
    /// Wall-clock seconds spent breeding and evaluating this generation.
    pub elapsed_seconds: f64,
}

/// Why the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Generation limit reached.
    MaxGenerations,
    /// Best fitness stopped improving.
    Stagnation,
    /// Wall-clock limit reached.
    TimeLimit,
    /// The best route reaches every survivor.
    AllSurvivorsReached,
    /// Cancelled through the engine's cancel handle.
    Cancelled,
}

/// Final statistics for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    /// Generations bred after the initial population.
    pub generations: usize,
    /// Routes scored in total.
    pub total_evaluations: u64,
    pub best_fitness: f32,
    pub final_average_fitness: f32,
    pub elapsed_seconds: f64,
    pub stop_reason: StopReason,
}

/// Result of a complete run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionResult {
    /// Best route of the final population.
    pub best: RouteSnapshot,
    /// Best routes of the final population, fittest first.
    pub top: Vec<RouteSnapshot>,
    /// Survivors present in the grid.
    pub total_survivors: usize,
    /// One entry per generation, starting with the initial population.
    pub history: Vec<GenerationStats>,
    pub stats: RunStats,
}
