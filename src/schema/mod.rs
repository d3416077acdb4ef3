//! Schema module - Configuration, program model and patch types for repair runs.

mod config;
mod coverage;
mod evolution;
mod manifest;
mod model;
mod patch;

pub use config::*;
pub use coverage::*;
pub use evolution::*;
pub use manifest::*;
pub use model::*;
pub use patch::*;
