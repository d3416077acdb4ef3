//! Configuration types for a repair run.
//!
//! Every recognised option lives in a typed section with a serde default, so a
//! configuration file only needs to name the options it overrides. The
//! camelCase command-line names (`thr`, `waitTime`, `maxNumberOfEdits`, ...)
//! are accepted as aliases.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{NoveltyConfig, SearchConfig};

/// Top-level repair configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Fault localization and model trimming.
    #[serde(default)]
    pub localization: LocalizationConfig,
    /// Evolutionary search settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// Candidate evaluation settings.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Novelty search settings.
    #[serde(default)]
    pub novelty: NoveltyConfig,
    /// Patch output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Spectrum-based suspiciousness formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SbflFormula {
    /// ef / sqrt((ef + ep) * (ef + nf))
    #[default]
    Ochiai,
    /// (ef / F) / (ef / F + ep / P)
    Tarantula,
}

/// Fault localization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizationConfig {
    /// Minimum suspiciousness for a location to be considered.
    #[serde(default = "default_threshold", alias = "thr")]
    pub threshold: f64,
    /// Suspiciousness formula.
    #[serde(default)]
    pub formula: SbflFormula,
    /// Maximum number of modification points kept for the search.
    #[serde(
        default = "default_max_points",
        alias = "maxNumberOfModificationPoints"
    )]
    pub max_modification_points: usize,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            formula: SbflFormula::default(),
            max_modification_points: default_max_points(),
        }
    }
}

fn default_threshold() -> f64 {
    0.1
}
fn default_max_points() -> usize {
    40
}

/// Candidate evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Weight of positive-test failures relative to negative-test failures.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Cap on simultaneously applied edits; the most suspicious are kept.
    #[serde(default, alias = "maxNumberOfEdits")]
    pub max_edits: Option<usize>,
    /// Fraction of positive tests sampled per evaluation.
    #[serde(default = "default_percentage")]
    pub percentage: f64,
    /// Per-evaluation test timeout in milliseconds.
    #[serde(default = "default_wait_time", alias = "waitTime")]
    pub wait_time_ms: u64,
    /// Per-evaluation compile timeout in milliseconds.
    #[serde(default = "default_compile_timeout", alias = "compileTimeout")]
    pub compile_timeout_ms: u64,
    /// Apply the redundant-edit filter rule before patching.
    #[serde(default = "default_filter_rules", alias = "miFilterRule")]
    pub filter_rules: bool,
}

impl EvaluationConfig {
    pub fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_time_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    /// Whether positive tests are sub-sampled (and re-checked in full).
    pub fn samples_positive(&self) -> bool {
        self.percentage < 1.0
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            weight: default_weight(),
            max_edits: None,
            percentage: default_percentage(),
            wait_time_ms: default_wait_time(),
            compile_timeout_ms: default_compile_timeout(),
            filter_rules: default_filter_rules(),
        }
    }
}

fn default_weight() -> f64 {
    0.5
}
fn default_percentage() -> f64 {
    1.0
}
fn default_wait_time() -> u64 {
    6000
}
fn default_compile_timeout() -> u64 {
    120_000
}
fn default_filter_rules() -> bool {
    true
}

/// Patch output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for patch records. Patches are only kept in memory if unset.
    #[serde(default, alias = "patchOutputRoot")]
    pub patch_output_dir: Option<PathBuf>,
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Suspiciousness threshold {0} must lie in [0, 1]")]
    InvalidThreshold(f64),
    #[error("Maximum number of modification points must be non-zero")]
    InvalidMaxPoints,
    #[error("Population size must be at least 2")]
    PopulationTooSmall,
    #[error("Number of generations must be non-zero")]
    InvalidGenerations,
    #[error("Number of objectives {0} must be 1, 2 or 3")]
    InvalidObjectiveCount(usize),
    #[error("Invalid probability for {name}: {value}")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("Invalid weight for {name}: {value} must be non-negative")]
    InvalidWeight { name: &'static str, value: f64 },
    #[error("Sampling percentage {0} must lie in (0, 1]")]
    InvalidPercentage(f64),
    #[error("Wait time must be positive")]
    InvalidWaitTime,
    #[error("Compile timeout must be positive")]
    InvalidCompileTimeout,
    #[error("Maximum number of edits must be non-zero")]
    InvalidMaxEdits,
    #[error("Novelty archive size and k must be non-zero")]
    InvalidNovelty,
}

impl RepairConfig {
    /// Validate the configuration once, before a session starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let loc = &self.localization;
        if !(0.0..=1.0).contains(&loc.threshold) {
            return Err(ConfigError::InvalidThreshold(loc.threshold));
        }
        if loc.max_modification_points == 0 {
            return Err(ConfigError::InvalidMaxPoints);
        }

        self.search.validate()?;

        let eval = &self.evaluation;
        if eval.weight < 0.0 {
            return Err(ConfigError::InvalidWeight {
                name: "weight",
                value: eval.weight,
            });
        }
        if !(eval.percentage > 0.0 && eval.percentage <= 1.0) {
            return Err(ConfigError::InvalidPercentage(eval.percentage));
        }
        if eval.wait_time_ms == 0 {
            return Err(ConfigError::InvalidWaitTime);
        }
        if eval.compile_timeout_ms == 0 {
            return Err(ConfigError::InvalidCompileTimeout);
        }
        if eval.max_edits == Some(0) {
            return Err(ConfigError::InvalidMaxEdits);
        }

        let novelty = &self.novelty;
        if novelty.k_neighbors == 0 || novelty.archive_size == 0 {
            return Err(ConfigError::InvalidNovelty);
        }
        if novelty.diversity_weight < 0.0 {
            return Err(ConfigError::InvalidWeight {
                name: "noveltyDiversityWeight",
                value: novelty.diversity_weight,
            });
        }

        Ok(())
    }
}
