//! Schema module - Configuration and value types for rescue route evolution.

mod config;
mod coordinate;
mod run;

pub use config::*;
pub use coordinate::*;
pub use run::*;
