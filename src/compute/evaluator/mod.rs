//! Parallel fitness evaluation on a persistent worker pool.
//!
//! The dispatcher copies a population into fixed-capacity shared records,
//! splits the index range across workers and polls until every worker has
//! scored its slice. Workers poll for new batches the same way; there is no
//! blocking hand-off between the two sides.

mod pool;
mod shared;

use std::time::Duration;

pub use pool::ParallelEvaluator;
pub use shared::{SharedRoute, WorkerAssignment, partition};

use super::Route;

/// Worker pool failures.
#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("Failed to spawn fitness worker {id}: {source}")]
    Spawn {
        id: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("Population of {size} exceeds the shared capacity of {max} routes")]
    PopulationTooLarge { size: usize, max: usize },
    #[error("A generation is already being evaluated")]
    Busy,
    #[error("No generation has been dispatched")]
    NotDispatched,
    #[error("Workers have not finished the current generation")]
    NotReady,
    #[error("Fitness worker {id} exited unexpectedly")]
    WorkerDied { id: usize },
    #[error("Timed out after {waited:?} with {completed}/{expected} workers finished")]
    CollectTimeout {
        waited: Duration,
        completed: usize,
        expected: usize,
    },
    #[error("Fitness workers {stuck:?} did not exit within the grace period")]
    ShutdownTimeout { stuck: Vec<usize> },
}

/// Score a population on an already running pool.
///
/// The pool scores against the grid and fitness model it was spawned with.
pub fn evaluate_population(
    evaluator: &mut ParallelEvaluator,
    population: &mut [Route],
    generation: usize,
) -> Result<(), EvaluatorError> {
    evaluator.evaluate(population, generation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{FitnessModel, Grid, RouteRng};
    use crate::schema::{Coordinate, FitnessWeights, WorkerConfig};
    use std::sync::Arc;

    #[test]
    fn test_evaluate_population_scores_in_place() {
        let mut grid = Grid::new(6, 6, 2).unwrap();
        grid.add_survivor(Coordinate::new(4, 1, 1));
        let grid = Arc::new(grid);
        let model = Arc::new(FitnessModel::new(FitnessWeights::default(), 100));

        let mut population = RouteRng::new(9).initial_population(&grid, 12, 100);
        let mut expected = population.clone();
        model.score_population(&mut expected, &grid);

        let config = WorkerConfig {
            num_workers: 3,
            worker_poll_ms: 1,
            master_poll_ms: 1,
            ..WorkerConfig::default()
        };
        let mut pool =
            ParallelEvaluator::spawn(Arc::clone(&grid), Arc::clone(&model), config).unwrap();
        evaluate_population(&mut pool, &mut population, 0).unwrap();
        assert!(!pool.is_busy());

        let scores: Vec<f32> = population.iter().map(|r| r.fitness).collect();
        let want: Vec<f32> = expected.iter().map(|r| r.fitness).collect();
        assert_eq!(scores, want);
        pool.shutdown().unwrap();
    }
}
