//! Configuration types for rescue route evolution.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Coordinate;

/// Coordinate capacity of one shared evaluation record. Longer routes are
/// truncated when handed to the worker pool.
pub const MAX_ROUTE_LENGTH: usize = 1000;
/// Number of route records in the shared evaluation region.
pub const MAX_POPULATION: usize = 500;
/// Upper bound on worker count.
pub const MAX_WORKERS: usize = 16;
/// Upper bound on survivors placed in a grid.
pub const MAX_SURVIVORS: usize = 50;

/// Top-level run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RescueConfig {
    /// Environment layout.
    #[serde(default)]
    pub grid: GridConfig,
    /// Genetic algorithm parameters.
    #[serde(default)]
    pub genetic: GeneticConfig,
    /// Fitness weights.
    #[serde(default)]
    pub fitness: FitnessWeights,
    /// Worker pool settings.
    #[serde(default)]
    pub workers: WorkerConfig,
    /// Stopping conditions.
    #[serde(default)]
    pub termination: TerminationConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

/// Grid dimensions and population of the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Cells along X.
    #[serde(default = "default_grid_width")]
    pub width: usize,
    /// Cells along Y.
    #[serde(default = "default_grid_height")]
    pub height: usize,
    /// Floors (Z).
    #[serde(default = "default_grid_depth")]
    pub depth: usize,
    /// Survivors to place.
    #[serde(default = "default_num_survivors")]
    pub num_survivors: usize,
    /// Share of cells turned into debris, in percent.
    #[serde(default = "default_obstacle_percent")]
    pub obstacle_percent: u32,
    /// Robot start cell.
    #[serde(default)]
    pub start: Coordinate,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: default_grid_width(),
            height: default_grid_height(),
            depth: default_grid_depth(),
            num_survivors: default_num_survivors(),
            obstacle_percent: default_obstacle_percent(),
            start: Coordinate::ORIGIN,
        }
    }
}

fn default_grid_width() -> usize {
    15
}
fn default_grid_height() -> usize {
    15
}
fn default_grid_depth() -> usize {
    4
}
fn default_num_survivors() -> usize {
    8
}
fn default_obstacle_percent() -> u32 {
    25
}

/// Genetic algorithm parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneticConfig {
    /// Routes per generation.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Generation limit.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Probability that a child is mutated (0.0-1.0).
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f32,
    /// Probability that a child is produced by crossover rather than cloning (0.0-1.0).
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f32,
    /// Share of the population carried over unchanged, in percent.
    #[serde(default = "default_elitism_percent")]
    pub elitism_percent: u32,
    /// Candidates drawn per tournament.
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
    /// Longest route the operators and the fitness normalization expect.
    #[serde(default = "default_max_route_length")]
    pub max_route_length: usize,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            max_generations: default_max_generations(),
            mutation_rate: default_mutation_rate(),
            crossover_rate: default_crossover_rate(),
            elitism_percent: default_elitism_percent(),
            tournament_size: default_tournament_size(),
            max_route_length: default_max_route_length(),
        }
    }
}

impl GeneticConfig {
    /// Number of elites carried into each new generation.
    pub fn elitism_count(&self) -> usize {
        self.population_size * self.elitism_percent as usize / 100
    }
}

fn default_population_size() -> usize {
    50
}
fn default_max_generations() -> usize {
    100
}
fn default_mutation_rate() -> f32 {
    0.05
}
fn default_crossover_rate() -> f32 {
    0.85
}
fn default_elitism_percent() -> u32 {
    10
}
fn default_tournament_size() -> usize {
    5
}
fn default_max_route_length() -> usize {
    MAX_ROUTE_LENGTH
}

/// Weights of the four fitness components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessWeights {
    /// Reward per fraction of survivors reached.
    #[serde(default = "default_w_survivors")]
    pub survivors: f32,
    /// Reward per fraction of the grid covered.
    #[serde(default = "default_w_coverage")]
    pub coverage: f32,
    /// Penalty per fraction of the maximum route length used.
    #[serde(default = "default_w_length")]
    pub length: f32,
    /// Penalty per fraction of the maximum expected risk.
    #[serde(default = "default_w_risk")]
    pub risk: f32,
    /// Risk that normalizes to 1.0. Derived from the maximum route length when unset.
    #[serde(default)]
    pub max_expected_risk: Option<f32>,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            survivors: default_w_survivors(),
            coverage: default_w_coverage(),
            length: default_w_length(),
            risk: default_w_risk(),
            max_expected_risk: None,
        }
    }
}

fn default_w_survivors() -> f32 {
    15.0
}
fn default_w_coverage() -> f32 {
    8.0
}
fn default_w_length() -> f32 {
    1.5
}
fn default_w_risk() -> f32 {
    3.0
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Persistent fitness workers.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Sleep between worker polls for new work, in milliseconds.
    #[serde(default = "default_worker_poll_ms")]
    pub worker_poll_ms: u64,
    /// Sleep between dispatcher polls for completion, in milliseconds.
    #[serde(default = "default_master_poll_ms")]
    pub master_poll_ms: u64,
    /// Longest the dispatcher waits for a generation before failing, in milliseconds.
    #[serde(default = "default_collect_timeout_ms")]
    pub collect_timeout_ms: u64,
    /// Time given to workers to exit after termination is requested, in milliseconds.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            worker_poll_ms: default_worker_poll_ms(),
            master_poll_ms: default_master_poll_ms(),
            collect_timeout_ms: default_collect_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl WorkerConfig {
    #[inline]
    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_ms)
    }

    #[inline]
    pub fn master_poll_interval(&self) -> Duration {
        Duration::from_millis(self.master_poll_ms)
    }

    #[inline]
    pub fn collect_timeout(&self) -> Duration {
        Duration::from_millis(self.collect_timeout_ms)
    }

    #[inline]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_num_workers() -> usize {
    4
}
fn default_worker_poll_ms() -> u64 {
    10
}
fn default_master_poll_ms() -> u64 {
    1
}
fn default_collect_timeout_ms() -> u64 {
    60_000
}
fn default_shutdown_grace_ms() -> u64 {
    2_000
}

/// Stopping conditions for the generational loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminationConfig {
    /// Generations without meaningful improvement before stopping.
    #[serde(default = "default_stagnation_limit")]
    pub stagnation_limit: usize,
    /// Best-fitness change below which a generation counts as stagnant.
    #[serde(default = "default_stagnation_tolerance")]
    pub stagnation_tolerance: f32,
    /// Wall-clock limit in seconds.
    #[serde(default = "default_time_limit_secs")]
    pub time_limit_secs: Option<u64>,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            stagnation_limit: default_stagnation_limit(),
            stagnation_tolerance: default_stagnation_tolerance(),
            time_limit_secs: default_time_limit_secs(),
        }
    }
}

fn default_stagnation_limit() -> usize {
    20
}
fn default_stagnation_tolerance() -> f32 {
    0.01
}
fn default_time_limit_secs() -> Option<u64> {
    Some(300)
}

/// Configuration problems that cannot be repaired by substituting a default.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Grid dimensions {width}x{height}x{depth} out of range (1-100 x 1-100 x 1-20)")]
    InvalidDimensions {
        width: usize,
        height: usize,
        depth: usize,
    },
    #[error("Survivor count {0} must be between 1 and {max}", max = MAX_SURVIVORS)]
    InvalidSurvivorCount(usize),
    #[error("Too many survivors ({survivors}) for a grid of {cells} cells")]
    TooManySurvivors { survivors: usize, cells: usize },
    #[error("Population size {0} must be between 1 and {max}", max = MAX_POPULATION)]
    InvalidPopulationSize(usize),
    #[error("Max generations {0} must be between 1 and 10000")]
    InvalidGenerations(usize),
    #[error("Tournament size {size} must be between 1 and the population size {population}")]
    InvalidTournamentSize { size: usize, population: usize },
}

impl RescueConfig {
    /// Validate the configuration.
    ///
    /// Recoverable problems are logged and replaced by defaults in place;
    /// only structurally impossible settings are returned as errors.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let g = &mut self.grid;
        if !(1..=100).contains(&g.width)
            || !(1..=100).contains(&g.height)
            || !(1..=20).contains(&g.depth)
        {
            return Err(ConfigError::InvalidDimensions {
                width: g.width,
                height: g.height,
                depth: g.depth,
            });
        }
        if !(1..=MAX_SURVIVORS).contains(&g.num_survivors) {
            return Err(ConfigError::InvalidSurvivorCount(g.num_survivors));
        }
        let cells = g.width * g.height * g.depth;
        if g.num_survivors >= cells {
            return Err(ConfigError::TooManySurvivors {
                survivors: g.num_survivors,
                cells,
            });
        }
        if g.obstacle_percent > 80 {
            log::warn!(
                "obstacle_percent {} should be 0-80, resetting to {}",
                g.obstacle_percent,
                default_obstacle_percent()
            );
            g.obstacle_percent = default_obstacle_percent();
        }
        let start = g.start;
        if start.x < 0
            || start.y < 0
            || start.z < 0
            || start.x as usize >= g.width
            || start.y as usize >= g.height
            || start.z as usize >= g.depth
        {
            log::warn!("start position {start} out of bounds, using the origin");
            g.start = Coordinate::ORIGIN;
        }

        let ga = &mut self.genetic;
        if !(1..=MAX_POPULATION).contains(&ga.population_size) {
            return Err(ConfigError::InvalidPopulationSize(ga.population_size));
        }
        if !(1..=10_000).contains(&ga.max_generations) {
            return Err(ConfigError::InvalidGenerations(ga.max_generations));
        }
        if !(0.0..=1.0).contains(&ga.mutation_rate) {
            log::warn!(
                "mutation_rate {} must be 0.0-1.0, resetting to {}",
                ga.mutation_rate,
                default_mutation_rate()
            );
            ga.mutation_rate = default_mutation_rate();
        }
        if !(0.0..=1.0).contains(&ga.crossover_rate) {
            log::warn!(
                "crossover_rate {} must be 0.0-1.0, resetting to {}",
                ga.crossover_rate,
                default_crossover_rate()
            );
            ga.crossover_rate = default_crossover_rate();
        }
        if ga.elitism_percent > 50 {
            log::warn!(
                "elitism_percent {} should be 0-50, resetting to {}",
                ga.elitism_percent,
                default_elitism_percent()
            );
            ga.elitism_percent = default_elitism_percent();
        }
        if ga.tournament_size == 0 || ga.tournament_size > ga.population_size {
            return Err(ConfigError::InvalidTournamentSize {
                size: ga.tournament_size,
                population: ga.population_size,
            });
        }
        if ga.max_route_length == 0 || ga.max_route_length > MAX_ROUTE_LENGTH {
            log::warn!(
                "max_route_length {} must be 1-{MAX_ROUTE_LENGTH}, using {MAX_ROUTE_LENGTH}",
                ga.max_route_length
            );
            ga.max_route_length = MAX_ROUTE_LENGTH;
        }

        let w = &mut self.fitness;
        let defaults = FitnessWeights::default();
        for (name, value, default) in [
            ("survivors", &mut w.survivors, defaults.survivors),
            ("coverage", &mut w.coverage, defaults.coverage),
            ("length", &mut w.length, defaults.length),
            ("risk", &mut w.risk, defaults.risk),
        ] {
            if *value < 0.0 {
                log::warn!("fitness weight {name} should be non-negative, using {default}");
                *value = default;
            }
        }
        if let Some(risk) = w.max_expected_risk
            && risk <= 0.0
        {
            log::warn!("max_expected_risk {risk} must be positive, deriving it instead");
            w.max_expected_risk = None;
        }

        let workers = &mut self.workers;
        if !(1..=MAX_WORKERS).contains(&workers.num_workers) {
            log::warn!(
                "num_workers {} must be 1-{MAX_WORKERS}, using {}",
                workers.num_workers,
                default_num_workers()
            );
            workers.num_workers = default_num_workers();
        }

        let t = &mut self.termination;
        if t.stagnation_limit == 0 {
            log::warn!(
                "stagnation_limit must be positive, using {}",
                default_stagnation_limit()
            );
            t.stagnation_limit = default_stagnation_limit();
        }

        Ok(())
    }
}
