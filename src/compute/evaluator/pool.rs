//! Persistent fitness worker pool.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::compute::{FitnessModel, Grid, Route};
use crate::schema::{MAX_POPULATION, MAX_WORKERS, WorkerConfig};

use super::EvaluatorError;
use super::shared::{SharedRegion, partition};

/// Dispatcher side of the worker pool.
///
/// Workers are spawned once and reused for every generation. Each cycle is
/// [`dispatch`](Self::dispatch), then [`wait_for_completion`](Self::wait_for_completion)
/// (or repeated [`poll_completion`](Self::poll_completion)), then
/// [`collect`](Self::collect). [`evaluate`](Self::evaluate) runs all three.
pub struct ParallelEvaluator {
    region: Arc<SharedRegion>,
    workers: Vec<JoinHandle<()>>,
    config: WorkerConfig,
    in_flight: bool,
}

impl ParallelEvaluator {
    /// Start `config.num_workers` workers (clamped to 1-16) scoring routes
    /// on `grid` with `model`.
    pub fn spawn(
        grid: Arc<Grid>,
        model: Arc<FitnessModel>,
        config: WorkerConfig,
    ) -> Result<Self, EvaluatorError> {
        let mut config = config;
        if !(1..=MAX_WORKERS).contains(&config.num_workers) {
            let clamped = config.num_workers.clamp(1, MAX_WORKERS);
            log::warn!(
                "num_workers {} out of range, using {clamped}",
                config.num_workers
            );
            config.num_workers = clamped;
        }

        let region = Arc::new(SharedRegion::new());
        let mut workers = Vec::with_capacity(config.num_workers);

        for id in 0..config.num_workers {
            let region_ref = Arc::clone(&region);
            let grid = Arc::clone(&grid);
            let model = Arc::clone(&model);
            let poll = config.worker_poll_interval();

            let spawned = thread::Builder::new()
                .name(format!("fitness-worker-{id}"))
                .spawn(move || worker_loop(id, &region_ref, &grid, &model, poll));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    region.lock_state().terminate = true;
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(EvaluatorError::Spawn { id, source });
                }
            }
        }

        log::info!("Started {} fitness workers", config.num_workers);

        Ok(Self {
            region,
            workers,
            config,
            in_flight: false,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    /// True between a dispatch and its collection.
    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Hand a population to the workers.
    ///
    /// Routes longer than the wire record are truncated; [`collect`](Self::collect)
    /// writes the truncated coordinates back.
    pub fn dispatch(
        &mut self,
        population: &[Route],
        generation: usize,
    ) -> Result<(), EvaluatorError> {
        if self.in_flight {
            return Err(EvaluatorError::Busy);
        }
        if population.len() > MAX_POPULATION {
            return Err(EvaluatorError::PopulationTooLarge {
                size: population.len(),
                max: MAX_POPULATION,
            });
        }

        let mut truncated = 0;
        for (i, route) in population.iter().enumerate() {
            if self.region.lock_route(i).store(route) {
                truncated += 1;
            }
        }
        if truncated > 0 {
            log::debug!("Generation {generation}: truncated {truncated} routes to wire capacity");
        }

        let assignments = partition(population.len(), self.config.num_workers);

        let mut state = self.region.lock_state();
        state.population_size = population.len();
        state.assignments = assignments;
        state.generation = generation;
        state.best_fitness = f32::NEG_INFINITY;
        state.best_index = None;
        state.completed = 0;
        state.epoch += 1;
        state.work_ready = true;
        drop(state);

        self.in_flight = true;
        log::trace!(
            "Dispatched generation {generation} ({} routes)",
            population.len()
        );
        Ok(())
    }

    /// Whether every worker has finished the current batch.
    ///
    /// Fails if a worker thread has exited without being asked to.
    pub fn poll_completion(&self) -> Result<bool, EvaluatorError> {
        if !self.in_flight {
            return Err(EvaluatorError::NotDispatched);
        }

        let done = {
            let state = self.region.lock_state();
            state.completed >= self.config.num_workers
        };
        if done {
            return Ok(true);
        }

        if let Some(id) = self.workers.iter().position(|w| w.is_finished()) {
            return Err(EvaluatorError::WorkerDied { id });
        }
        Ok(false)
    }

    /// Poll until the batch completes, a worker dies, or the collect timeout
    /// passes.
    pub fn wait_for_completion(&self) -> Result<(), EvaluatorError> {
        let started = Instant::now();
        let timeout = self.config.collect_timeout();
        let poll = self.config.master_poll_interval();

        loop {
            if self.poll_completion()? {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                let completed = self.region.lock_state().completed;
                return Err(EvaluatorError::CollectTimeout {
                    waited: started.elapsed(),
                    completed,
                    expected: self.config.num_workers,
                });
            }
            thread::sleep(poll);
        }
    }

    /// Read results back into `population` and return the pool to idle.
    ///
    /// `population` must be the slice that was dispatched.
    pub fn collect(&mut self, population: &mut [Route]) -> Result<(), EvaluatorError> {
        if !self.poll_completion()? {
            return Err(EvaluatorError::NotReady);
        }

        let size = {
            let mut state = self.region.lock_state();
            state.work_ready = false;
            state.completed = 0;
            state.population_size
        };
        self.in_flight = false;

        for (i, route) in population.iter_mut().enumerate().take(size) {
            self.region.lock_route(i).load_into(route);
        }
        Ok(())
    }

    /// Dispatch, wait and collect one generation.
    pub fn evaluate(
        &mut self,
        population: &mut [Route],
        generation: usize,
    ) -> Result<(), EvaluatorError> {
        self.dispatch(population, generation)?;
        self.wait_for_completion()?;
        self.collect(population)
    }

    /// Best fitness of the last dispatched batch and the index holding it.
    pub fn best(&self) -> Option<(usize, f32)> {
        let state = self.region.lock_state();
        state.best_index.map(|i| (i, state.best_fitness))
    }

    /// Ask every worker to exit at its next poll.
    pub fn request_termination(&self) {
        self.region.lock_state().terminate = true;
    }

    /// Stop the workers and wait for them to exit.
    ///
    /// Workers still running once the grace period passes are detached and
    /// reported.
    pub fn shutdown(mut self) -> Result<(), EvaluatorError> {
        self.stop_workers()
    }

    fn stop_workers(&mut self) -> Result<(), EvaluatorError> {
        if self.workers.is_empty() {
            return Ok(());
        }
        self.request_termination();

        let deadline = Instant::now() + self.config.shutdown_grace();
        let poll = self.config.master_poll_interval().max(Duration::from_millis(1));
        while self.workers.iter().any(|w| !w.is_finished()) && Instant::now() < deadline {
            thread::sleep(poll);
        }

        let mut stuck = Vec::new();
        for (id, handle) in self.workers.drain(..).enumerate() {
            if !handle.is_finished() {
                stuck.push(id);
                continue;
            }
            if handle.join().is_err() {
                log::warn!("Fitness worker {id} panicked");
            }
        }

        if stuck.is_empty() {
            log::info!("Fitness workers stopped");
            Ok(())
        } else {
            Err(EvaluatorError::ShutdownTimeout { stuck })
        }
    }
}

impl Drop for ParallelEvaluator {
    fn drop(&mut self) {
        if let Err(e) = self.stop_workers() {
            log::warn!("{e}");
        }
    }
}

fn worker_loop(
    id: usize,
    region: &SharedRegion,
    grid: &Grid,
    model: &FitnessModel,
    poll: Duration,
) {
    let mut last_epoch = 0;

    loop {
        let job = {
            let state = region.lock_state();
            if state.terminate {
                break;
            }
            if state.work_ready && state.epoch != last_epoch {
                Some((state.epoch, state.assignments.get(id).copied()))
            } else {
                None
            }
        };

        let Some((epoch, assignment)) = job else {
            thread::sleep(poll);
            continue;
        };
        last_epoch = epoch;

        let mut best: Option<(f32, usize)> = None;
        if let Some(range) = assignment {
            for i in range.start..range.end {
                let mut slot = region.lock_route(i);
                let breakdown = model.evaluate_coordinates(slot.coordinates(), grid);
                slot.survivors_reached = breakdown.survivors_reached as u32;
                slot.collision_count = breakdown.collision_count as u32;
                slot.fitness = breakdown.fitness;

                if best.is_none_or(|(f, _)| breakdown.fitness > f) {
                    best = Some((breakdown.fitness, i));
                }
            }
        }

        let mut state = region.lock_state();
        if let Some((fitness, index)) = best {
            state.offer_best(fitness, index);
        }
        state.completed += 1;
    }

    log::debug!("Fitness worker {id} exiting");
}
