//! Evolution configuration and reporting types for the repair search.
//!
//! This module provides types for configuring the multi-objective search over
//! edit combinations and for reporting its progress and results.

use serde::{Deserialize, Serialize};

use super::{ConfigError, PatchRecord};

/// Evolutionary search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of individuals in the population.
    #[serde(default = "default_population_size", alias = "populationSize")]
    pub population_size: usize,
    /// Number of generations; the evaluation budget is
    /// `population_size * max_generations`.
    #[serde(default = "default_max_generations", alias = "maxGenerations")]
    pub max_generations: usize,
    /// Number of objectives (1, 2 or 3). See `ObjectiveVector` for layouts.
    #[serde(default = "default_objectives", alias = "numberOfObjectives")]
    pub number_of_objectives: usize,
    /// How the initial active bits are drawn.
    #[serde(default, alias = "initializationStrategy")]
    pub initialization_strategy: InitializationStrategy,
    /// Suspicion-to-probability scale for prior-based initialization.
    #[serde(default = "default_mu")]
    pub mu: f64,
    /// Probability of applying crossover to a selected pair.
    #[serde(default = "default_crossover_probability")]
    pub crossover_probability: f64,
    /// Per-gene mutation probability. Defaults to `1 / N` for N points.
    #[serde(default)]
    pub mutation_probability: Option<f64>,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            max_generations: default_max_generations(),
            number_of_objectives: default_objectives(),
            initialization_strategy: InitializationStrategy::default(),
            mu: default_mu(),
            crossover_probability: default_crossover_probability(),
            mutation_probability: None,
            random_seed: None,
        }
    }
}

fn default_population_size() -> usize {
    40
}
fn default_max_generations() -> usize {
    50
}
fn default_objectives() -> usize {
    2
}
fn default_mu() -> f64 {
    0.06
}
fn default_crossover_probability() -> f64 {
    1.0
}

impl SearchConfig {
    /// Total number of fitness evaluations allowed.
    pub fn max_evaluations(&self) -> u64 {
        self.population_size as u64 * self.max_generations as u64
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size < 2 {
            return Err(ConfigError::PopulationTooSmall);
        }
        if self.max_generations == 0 {
            return Err(ConfigError::InvalidGenerations);
        }
        if !(1..=3).contains(&self.number_of_objectives) {
            return Err(ConfigError::InvalidObjectiveCount(
                self.number_of_objectives,
            ));
        }
        if self.mu < 0.0 {
            return Err(ConfigError::InvalidWeight {
                name: "mu",
                value: self.mu,
            });
        }
        let check_probability = |value: f64, name: &'static str| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::InvalidProbability { name, value })
            }
        };
        check_probability(self.crossover_probability, "crossover")?;
        if let Some(p) = self.mutation_probability {
            check_probability(p, "mutation")?;
        }
        Ok(())
    }
}

/// Strategy for drawing the initial `active` bits. Lowercase and uppercase
/// names are accepted when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InitializationStrategy {
    /// `P(active_i) = suspiciousness_i * mu`.
    #[default]
    #[serde(alias = "prior", alias = "PRIOR")]
    Prior,
    /// `P(active_i) = 0.5`.
    #[serde(alias = "random", alias = "RANDOM")]
    Random,
}

/// Novelty search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoveltyMode {
    /// Base fitness only.
    #[default]
    None,
    /// Base fitness minus a diversity bonus.
    Lightweight,
    /// Negated novelty score as a search objective.
    Full,
}

/// Novelty search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoveltyConfig {
    #[serde(default, alias = "noveltySearchMode")]
    pub mode: NoveltyMode,
    /// Number of nearest neighbors for the novelty score.
    #[serde(default = "default_k_neighbors", alias = "noveltyKNeighbors")]
    pub k_neighbors: usize,
    /// Behavior archive capacity.
    #[serde(default = "default_archive_size", alias = "noveltyArchiveSize")]
    pub archive_size: usize,
    /// Scale of the diversity bonus in lightweight mode.
    #[serde(
        default = "default_diversity_weight",
        alias = "noveltyDiversityWeight"
    )]
    pub diversity_weight: f64,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            mode: NoveltyMode::default(),
            k_neighbors: default_k_neighbors(),
            archive_size: default_archive_size(),
            diversity_weight: default_diversity_weight(),
        }
    }
}

fn default_k_neighbors() -> usize {
    15
}
fn default_archive_size() -> usize {
    200
}
fn default_diversity_weight() -> f64 {
    0.3
}

// ============================================================================
// Progress and Result Types
// ============================================================================

/// Progress update emitted after each generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProgress {
    /// Current generation number.
    pub generation: usize,
    /// Total generations planned.
    pub total_generations: usize,
    /// Fitness evaluations performed so far.
    pub evaluations: u64,
    /// Evaluation budget.
    pub max_evaluations: u64,
    /// Best (lowest) base fitness seen so far.
    pub best_fitness: f64,
    /// Size of the current first non-dominated front.
    pub front_size: usize,
    /// Distinct test-adequate patches found so far.
    pub patches_found: usize,
    /// Current phase of the algorithm.
    pub phase: SearchPhase,
}

/// Snapshot of an evaluated candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSnapshot {
    /// Unique identifier.
    pub id: u64,
    /// Generation this candidate was created.
    pub generation: usize,
    /// Objective values, in the configured layout.
    pub objectives: Vec<f64>,
    /// Non-domination rank (0 = first front).
    pub rank: usize,
    /// Indices of active modification points.
    pub active_points: Vec<usize>,
    /// Parent IDs (for genealogy).
    pub parents: Vec<u64>,
}

/// Search history for analysis.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchHistory {
    /// Best base fitness per generation.
    pub best_fitness: Vec<f64>,
    /// First-front size per generation.
    pub front_size: Vec<usize>,
    /// Mean number of active edits per generation.
    pub mean_edits: Vec<f64>,
    /// Mean pairwise genotype distance per generation.
    pub diversity: Vec<f64>,
    /// Cumulative patches found per generation.
    pub patches_found: Vec<usize>,
}

/// Current phase of the search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SearchPhase {
    #[default]
    Initializing,
    Evaluating,
    Complete,
    Stopped,
}

/// Final result of a search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// First non-dominated front of the final population.
    pub front: Vec<CandidateSnapshot>,
    /// Accepted patches, in discovery order.
    pub patches: Vec<PatchRecord>,
    /// Statistics from the run.
    pub stats: SearchStats,
    /// Full history for analysis.
    pub history: SearchHistory,
}

/// Statistics from a search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStats {
    /// Generations completed after the initial population.
    pub generations: usize,
    /// Total evaluations performed.
    pub total_evaluations: u64,
    /// Best base fitness achieved.
    pub best_fitness: f64,
    /// Time taken (in seconds).
    pub elapsed_seconds: f64,
    /// Evaluations per second.
    pub evaluations_per_second: f64,
    /// Reason for stopping.
    pub stop_reason: StopReason,
}

/// Reason the search stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Evaluation budget exhausted.
    MaxEvaluations,
    /// User cancelled.
    Cancelled,
}
