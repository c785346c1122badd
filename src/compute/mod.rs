//! Compute module - Grid, pathfinding, fitness and the genetic search.

mod fitness;
mod genetic;
mod grid;
mod pathfinder;
mod route;
mod search;

pub mod evaluator;

pub use evaluator::{EvaluatorError, ParallelEvaluator, evaluate_population};
pub use fitness::*;
pub use genetic::*;
pub use grid::*;
pub use pathfinder::*;
pub use route::{DEFAULT_ROUTE_CAPACITY, Route, sort_by_fitness};
pub use search::*;
