//! Rescue GA - Evolving rescue-robot routes through collapsed buildings.
//!
//! A robot starts somewhere in a 3D grid of debris and must reach as many
//! trapped survivors as it can while covering ground and avoiding risky
//! moves. Candidate routes are seeded with A* and random walks, scored on a
//! persistent pool of fitness workers and bred with a genetic algorithm.
//!
//! # Architecture
//!
//! - `schema`: Configuration, coordinates and serializable run results
//! - `compute`: Grid, routes, A*, fitness, genetic operators, worker pool
//!   and the generational engine
//! - `report`: Writing run output to disk
//!
//! # Example
//!
//! ```rust,no_run
//! use rescue_ga::{compute::EvolutionEngine, schema::RescueConfig};
//!
//! let mut config = RescueConfig::default();
//! config.random_seed = Some(42);
//!
//! let mut engine = EvolutionEngine::new(config).unwrap();
//! let result = engine.run().unwrap();
//!
//! println!(
//!     "Best route reaches {}/{} survivors (fitness {:.2})",
//!     result.best.survivors_reached, result.total_survivors, result.best.fitness
//! );
//! ```

pub mod compute;
pub mod report;
pub mod schema;

// Re-export commonly used types
pub use compute::{EvolutionEngine, FitnessModel, Grid, ParallelEvaluator, Route, find_path};
pub use schema::{Coordinate, EvolutionResult, RescueConfig};
