//! Compute module - Fault localization, candidate evaluation and search.

mod edit;
mod program;
mod session;
mod suspicion;

pub mod evolution;
pub mod harness;

pub use edit::*;
pub use program::*;
pub use session::*;
pub use suspicion::*;
