//! Evolutionary search over edit combinations.
//!
//! # Overview
//!
//! - **Genome** (`genome`): chromosome encoding, initialization, crossover and mutation
//! - **Fitness** (`fitness`): the evaluation pipeline and objective layouts
//! - **Novelty** (`novelty`): behavioral descriptors and the bounded archive
//! - **Search** (`search`): NSGA-II engine with cancellation and progress reporting
//! - **Patch store** (`archive`): deduplicated, test-adequate patches
//!
//! # Example
//!
//! ```rust,no_run
//! use evorepair::compute::evolution::{EvolutionEngine, FitnessEvaluator, PatchStore, RunContext};
//! # fn evaluator() -> FitnessEvaluator { unimplemented!() }
//!
//! let config = evorepair::schema::SearchConfig::default();
//! let ctx = RunContext::new(PatchStore::new());
//! let mut engine = EvolutionEngine::new(config, evaluator(), ctx);
//! let result = engine.run_with_callback(|progress| {
//!     println!(
//!         "Generation {}: {} evaluations, {} patches",
//!         progress.generation, progress.evaluations, progress.patches_found
//!     );
//! });
//! println!("Front size: {}", result.front.len());
//! ```

mod archive;
mod context;
mod fitness;
mod genome;
mod novelty;
mod search;

pub use archive::PatchStore;
pub use context::RunContext;
pub use fitness::{
    AppliedEdit, Evaluation, EvaluationBackend, EvaluationStatus, FitnessEvaluator,
    MAX_OBJECTIVES, ObjectiveVector, SENTINEL,
};
pub use genome::{Chromosome, GenomeRng, SearchBounds, chromosome_distance};
pub use novelty::{BehaviorArchive, BehaviorDescriptor, NoveltyError};
pub use search::{Candidate, EvolutionEngine, crowding_distance, non_dominated_sort};
