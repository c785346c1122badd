//! Generational loop driving route evolution.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::schema::{
    ConfigError, EvolutionResult, GenerationStats, RescueConfig, RouteSnapshot, RunStats,
    StopReason,
};

use super::evaluator::{EvaluatorError, ParallelEvaluator, evaluate_population};
use super::fitness::{PopulationStats, coverage_percent};
use super::route::sort_by_fitness;
use super::{FitnessModel, Grid, GridError, Route, RouteRng};

/// Routes kept in [`EvolutionResult::top`].
const TOP_ROUTES: usize = 5;
/// The all-survivors stop only applies after this many generations.
const MIN_GENERATIONS_BEFORE_SUCCESS: usize = 10;

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to build grid: {0}")]
    Grid(#[from] GridError),
    #[error("Fitness evaluation failed: {0}")]
    Evaluator(#[from] EvaluatorError),
}

/// Evolution engine that runs the search.
pub struct EvolutionEngine {
    config: RescueConfig,
    grid: Arc<Grid>,
    model: Arc<FitnessModel>,
    evaluator: Option<ParallelEvaluator>,
    rng: RouteRng,
    population: Vec<Route>,
    history: Vec<GenerationStats>,
    generation: usize,
    previous_best: f32,
    stagnation_count: usize,
    total_evaluations: u64,
    cancelled: Arc<AtomicBool>,
}

impl EvolutionEngine {
    /// Validate the configuration, generate the grid and start the worker pool.
    pub fn new(mut config: RescueConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let seed = config.random_seed.unwrap_or_else(rand::random);
        let mut rng = RouteRng::new(seed);
        let grid = Grid::generate(&config.grid, rng.inner())?;
        log::info!(
            "Generated {}x{}x{} grid with {} obstacles and {} survivors (seed {seed})",
            grid.width(),
            grid.height(),
            grid.depth(),
            grid.obstacle_count(),
            grid.survivor_count()
        );
        Self::build(config, grid, rng)
    }

    /// Run on a prepared grid instead of generating one.
    pub fn with_grid(mut config: RescueConfig, grid: Grid) -> Result<Self, EngineError> {
        config.validate()?;
        let seed = config.random_seed.unwrap_or_else(rand::random);
        Self::build(config, grid, RouteRng::new(seed))
    }

    fn build(config: RescueConfig, grid: Grid, rng: RouteRng) -> Result<Self, EngineError> {
        let grid = Arc::new(grid);
        let model = Arc::new(FitnessModel::from_config(&config));
        let evaluator = ParallelEvaluator::spawn(
            Arc::clone(&grid),
            Arc::clone(&model),
            config.workers.clone(),
        )?;

        Ok(Self {
            config,
            grid,
            model,
            evaluator: Some(evaluator),
            rng,
            population: Vec::new(),
            history: Vec::new(),
            generation: 0,
            previous_best: 0.0,
            stagnation_count: 0,
            total_evaluations: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &RescueConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn fitness_model(&self) -> &FitnessModel {
        &self.model
    }

    /// Current population, best first.
    pub fn population(&self) -> &[Route] {
        &self.population
    }

    pub fn history(&self) -> &[GenerationStats] {
        &self.history
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Get cancellation handle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    fn evaluator(&mut self) -> Result<&mut ParallelEvaluator, EngineError> {
        let evaluator = match self.evaluator.take() {
            Some(evaluator) => evaluator,
            None => ParallelEvaluator::spawn(
                Arc::clone(&self.grid),
                Arc::clone(&self.model),
                self.config.workers.clone(),
            )?,
        };
        Ok(self.evaluator.insert(evaluator))
    }

    /// Score `population` on the pool and sort it best first.
    fn evaluate(&mut self, population: &mut [Route], generation: usize) -> Result<(), EngineError> {
        evaluate_population(self.evaluator()?, population, generation)?;
        sort_by_fitness(population);
        self.total_evaluations += population.len() as u64;
        Ok(())
    }

    /// Record stats for the current population and update stagnation.
    fn record_generation(&mut self, elapsed: Duration) -> GenerationStats {
        let summary = PopulationStats::from_routes(&self.population);
        let stats = GenerationStats {
            generation: self.generation,
            best_fitness: summary.best,
            average_fitness: summary.average,
            worst_fitness: summary.worst,
            average_survivors: summary.average_survivors,
            average_length: summary.average_length,
            best_survivors: self.population.first().map_or(0, |r| r.survivors_reached),
            elapsed_seconds: elapsed.as_secs_f64(),
        };

        let tolerance = self.config.termination.stagnation_tolerance;
        if (summary.best - self.previous_best).abs() < tolerance {
            self.stagnation_count += 1;
        } else {
            self.stagnation_count = 0;
        }
        self.previous_best = summary.best;

        self.history.push(stats);
        stats
    }

    /// Check if evolution should stop.
    fn should_stop(&self, started: Instant) -> Option<StopReason> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Some(StopReason::Cancelled);
        }

        if self.stagnation_count >= self.config.termination.stagnation_limit {
            return Some(StopReason::Stagnation);
        }

        if let Some(limit) = self.config.termination.time_limit_secs
            && started.elapsed() > Duration::from_secs(limit)
        {
            return Some(StopReason::TimeLimit);
        }

        if self.generation > MIN_GENERATIONS_BEFORE_SUCCESS
            && self.grid.survivor_count() > 0
            && self
                .population
                .first()
                .is_some_and(|r| r.survivors_reached == self.grid.survivor_count())
        {
            return Some(StopReason::AllSurvivorsReached);
        }

        if self.generation >= self.config.genetic.max_generations {
            return Some(StopReason::MaxGenerations);
        }

        None
    }

    /// Run evolution, reporting each generation's stats to `callback`.
    pub fn run_with_callback<F>(&mut self, mut callback: F) -> Result<EvolutionResult, EngineError>
    where
        F: FnMut(&GenerationStats),
    {
        let started = Instant::now();
        self.history.clear();
        self.generation = 0;
        self.previous_best = 0.0;
        self.stagnation_count = 0;
        self.total_evaluations = 0;

        let ga = self.config.genetic.clone();
        let mut population = self
            .rng
            .initial_population(&self.grid, ga.population_size, ga.max_route_length);
        self.evaluate(&mut population, 0)?;
        self.population = population;
        callback(&self.record_generation(started.elapsed()));

        let stop_reason = loop {
            if let Some(reason) = self.should_stop(started) {
                break reason;
            }

            let generation_start = Instant::now();
            let mut next = self.rng.next_generation(&self.population, &self.grid, &ga);
            self.evaluate(&mut next, self.generation + 1)?;
            self.population = next;
            self.generation += 1;

            let stats = self.record_generation(generation_start.elapsed());
            log::info!(
                "Generation {}: best {:.3}, average {:.3}, survivors {}/{}",
                stats.generation,
                stats.best_fitness,
                stats.average_fitness,
                stats.best_survivors,
                self.grid.survivor_count()
            );
            callback(&stats);
        };

        log::info!("Stopping after generation {}: {stop_reason:?}", self.generation);

        if let Some(evaluator) = self.evaluator.take()
            && let Err(e) = evaluator.shutdown()
        {
            log::warn!("{e}");
        }

        Ok(self.result(stop_reason, started.elapsed()))
    }

    /// Run evolution (blocking).
    pub fn run(&mut self) -> Result<EvolutionResult, EngineError> {
        self.run_with_callback(|_| {})
    }

    /// Snapshot of a route with its coverage filled in.
    pub fn snapshot(&self, route: &Route) -> RouteSnapshot {
        route.to_snapshot(coverage_percent(route.coordinates(), &self.grid))
    }

    fn result(&self, stop_reason: StopReason, elapsed: Duration) -> EvolutionResult {
        let top: Vec<RouteSnapshot> = self
            .population
            .iter()
            .take(TOP_ROUTES)
            .map(|r| self.snapshot(r))
            .collect();
        let best = top.first().cloned().unwrap_or_else(|| RouteSnapshot {
            fitness: 0.0,
            survivors_reached: 0,
            collision_count: 0,
            coverage_percent: 0.0,
            coordinates: Vec::new(),
        });
        let summary = PopulationStats::from_routes(&self.population);

        EvolutionResult {
            best,
            top,
            total_survivors: self.grid.survivor_count(),
            history: self.history.clone(),
            stats: RunStats {
                generations: self.generation,
                total_evaluations: self.total_evaluations,
                best_fitness: summary.best,
                final_average_fitness: summary.average,
                elapsed_seconds: elapsed.as_secs_f64(),
                stop_reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Coordinate;

    fn small_config() -> RescueConfig {
        let mut config = RescueConfig::default();
        config.grid.width = 8;
        config.grid.height = 8;
        config.grid.depth = 2;
        config.grid.num_survivors = 3;
        config.grid.obstacle_percent = 15;
        config.genetic.population_size = 20;
        config.genetic.max_generations = 4;
        config.genetic.tournament_size = 3;
        config.genetic.max_route_length = 200;
        config.workers.num_workers = 2;
        config.workers.worker_poll_ms = 1;
        config.termination.stagnation_limit = 1000;
        config.termination.time_limit_secs = None;
        config.random_seed = Some(99);
        config
    }

    #[test]
    fn test_runs_to_generation_limit() {
        let mut engine = EvolutionEngine::new(small_config()).unwrap();
        let mut seen = Vec::new();
        let result = engine.run_with_callback(|s| seen.push(s.generation)).unwrap();

        assert_eq!(result.stats.stop_reason, StopReason::MaxGenerations);
        assert_eq!(result.stats.generations, 4);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(result.history.len(), 5);
        assert_eq!(result.stats.total_evaluations, 5 * 20);
        assert_eq!(result.top.len(), TOP_ROUTES);
        assert_eq!(result.best, result.top[0]);
        assert!(!result.best.coordinates.is_empty());
        assert!(result.top.windows(2).all(|w| w[0].fitness >= w[1].fitness));
    }

    #[test]
    fn test_elites_never_regress() {
        let mut engine = EvolutionEngine::new(small_config()).unwrap();
        let result = engine.run().unwrap();
        for w in result.history.windows(2) {
            assert!(w[1].best_fitness >= w[0].best_fitness);
        }
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let a = EvolutionEngine::new(small_config()).unwrap().run().unwrap();
        let b = EvolutionEngine::new(small_config()).unwrap().run().unwrap();
        assert_eq!(a.best.coordinates, b.best.coordinates);
        assert_eq!(a.stats.best_fitness, b.stats.best_fitness);
    }

    #[test]
    fn test_stagnation_stop() {
        let mut config = small_config();
        config.termination.stagnation_limit = 2;
        config.termination.stagnation_tolerance = 1e9;

        let result = EvolutionEngine::new(config).unwrap().run().unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Stagnation);
        assert_eq!(result.stats.generations, 1);
    }

    #[test]
    fn test_cancel_before_run() {
        let mut engine = EvolutionEngine::new(small_config()).unwrap();
        engine.cancel_handle().store(true, Ordering::Relaxed);
        let result = engine.run().unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
        assert_eq!(result.history.len(), 1);
    }

    #[test]
    fn test_fixed_grid_reaches_all_survivors() {
        let mut grid = Grid::new(6, 6, 2).unwrap();
        grid.add_survivor(Coordinate::new(5, 5, 1));
        grid.add_survivor(Coordinate::new(0, 5, 0));

        let mut config = small_config();
        config.genetic.max_generations = 30;
        let mut engine = EvolutionEngine::with_grid(config, grid).unwrap();
        let result = engine.run().unwrap();

        assert_eq!(result.total_survivors, 2);
        assert_eq!(result.best.survivors_reached, 2);
        assert_eq!(result.stats.stop_reason, StopReason::AllSurvivorsReached);
        assert_eq!(result.stats.generations, MIN_GENERATIONS_BEFORE_SUCCESS + 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = small_config();
        config.genetic.population_size = 0;
        assert!(matches!(
            EvolutionEngine::new(config),
            Err(EngineError::Config(ConfigError::InvalidPopulationSize(0)))
        ));
    }
}
