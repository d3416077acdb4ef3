//! Spectrum-based fault localization.
//!
//! Turns per-test coverage and pass/fail outcomes into a suspiciousness score
//! per location. Ochiai is the default formula:
//!
//! ```text
//! score(L) = ef / sqrt((ef + ep) * (ef + nf))   if ef > 0, else 0
//! ```
//!
//! where `ef`/`ep` count failing/passing tests that executed `L` and `nf`
//! counts failing tests that did not.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::schema::{CoverageReport, Location, SbflFormula, TestSets};

/// Location → suspiciousness in [0, 1]. Read-only once produced.
#[derive(Debug, Clone, Default)]
pub struct SuspicionMap {
    scores: HashMap<Location, f64>,
}

impl SuspicionMap {
    pub fn get(&self, location: &Location) -> Option<f64> {
        self.scores.get(location).copied()
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.scores.contains_key(location)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Location, f64)> {
        self.scores.iter().map(|(l, s)| (l, *s))
    }

    /// Entries sorted by descending score, ties broken by location.
    pub fn ranked(&self) -> Vec<(&Location, f64)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

impl FromIterator<(Location, f64)> for SuspicionMap {
    fn from_iter<I: IntoIterator<Item = (Location, f64)>>(iter: I) -> Self {
        Self {
            scores: iter.into_iter().collect(),
        }
    }
}

/// Executed-by-failing / executed-by-passing counts for one location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Spectrum {
    ef: usize,
    ep: usize,
}

/// Ochiai suspiciousness.
pub fn ochiai(ef: usize, ep: usize, nf: usize) -> f64 {
    if ef == 0 {
        return 0.0;
    }
    let ef = ef as f64;
    ef / ((ef + ep as f64) * (ef + nf as f64)).sqrt()
}

/// Tarantula suspiciousness.
pub fn tarantula(ef: usize, ep: usize, total_failed: usize, total_passed: usize) -> f64 {
    if ef == 0 || total_failed == 0 {
        return 0.0;
    }
    let fail_ratio = ef as f64 / total_failed as f64;
    let pass_ratio = if total_passed > 0 {
        ep as f64 / total_passed as f64
    } else {
        0.0
    };
    fail_ratio / (fail_ratio + pass_ratio)
}

/// Computes suspiciousness from coverage and derives the test sets.
#[derive(Debug, Clone)]
pub struct SuspicionScorer {
    formula: SbflFormula,
    spectrum: HashMap<Location, Spectrum>,
    tests: TestSets,
    scores: SuspicionMap,
}

impl SuspicionScorer {
    /// Score every location covered by the report.
    pub fn new(report: &CoverageReport, formula: SbflFormula) -> Self {
        let negative: BTreeSet<String> = report.failing().map(|t| t.test.clone()).collect();
        let mut positive: BTreeSet<String> = report.passing().map(|t| t.test.clone()).collect();

        let conflicting: Vec<String> = positive.intersection(&negative).cloned().collect();
        if !conflicting.is_empty() {
            warn!(
                "{} tests reported both passing and failing; treating them as failing",
                conflicting.len()
            );
            for test in &conflicting {
                positive.remove(test);
            }
        }

        // Tests are counted once per location even if reported repeatedly.
        let mut covering: HashMap<&Location, (HashSet<&str>, HashSet<&str>)> = HashMap::new();
        for test in &report.tests {
            let failing = negative.contains(&test.test);
            for location in &test.covered {
                let entry = covering.entry(location).or_default();
                if failing {
                    entry.0.insert(&test.test);
                } else {
                    entry.1.insert(&test.test);
                }
            }
        }
        let spectrum = covering
            .into_iter()
            .map(|(location, (failing, passing))| {
                (
                    location.clone(),
                    Spectrum {
                        ef: failing.len(),
                        ep: passing.len(),
                    },
                )
            })
            .collect();

        let mut scorer = Self {
            formula,
            spectrum,
            tests: TestSets::new(positive, negative),
            scores: SuspicionMap::default(),
        };
        scorer.scores = scorer.compute_scores();
        scorer
    }

    /// Load a coverage report and score it. An unreadable report leaves the
    /// scorer empty instead of failing the run.
    pub fn from_file<P: AsRef<Path>>(path: P, formula: SbflFormula) -> Self {
        let path = path.as_ref();
        match CoverageReport::load(path) {
            Ok(report) => Self::new(&report, formula),
            Err(e) => {
                warn!(
                    "Coverage data unavailable at {}: {e}; no fault signal to repair against",
                    path.display()
                );
                Self::new(&CoverageReport::default(), formula)
            }
        }
    }

    fn compute_scores(&self) -> SuspicionMap {
        let total_failed = self.tests.negative.len();
        let total_passed = self.tests.positive.len();

        if total_failed == 0 {
            warn!("No failing tests found; suspiciousness map is empty");
            return SuspicionMap::default();
        }

        info!(
            "Scoring {} locations ({} failing, {} passing tests, {:?})",
            self.spectrum.len(),
            total_failed,
            total_passed,
            self.formula
        );

        let formula = self.formula;
        self.spectrum
            .par_iter()
            .map(|(location, s)| {
                let score = match formula {
                    SbflFormula::Ochiai => ochiai(s.ef, s.ep, total_failed - s.ef),
                    SbflFormula::Tarantula => tarantula(s.ef, s.ep, total_failed, total_passed),
                };
                (location.clone(), score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect::<HashMap<_, _>>()
            .into_iter()
            .collect()
    }

    /// Suspiciousness of a location (0 if never executed by a failing test).
    pub fn score(&self, location: &Location) -> f64 {
        self.scores.get(location).unwrap_or(0.0)
    }

    /// All non-zero scores.
    pub fn scores(&self) -> &SuspicionMap {
        &self.scores
    }

    /// Exactly the locations whose score is at least `threshold`.
    pub fn search_suspicious(&self, threshold: f64) -> SuspicionMap {
        let map: SuspicionMap = self
            .scores
            .iter()
            .filter(|(_, score)| *score >= threshold)
            .map(|(l, s)| (l.clone(), s))
            .collect();
        debug!(
            "{} of {} locations at or above threshold {threshold}",
            map.len(),
            self.scores.len()
        );
        map
    }

    /// Positive (passing) and negative (failing) tests of the unmodified program.
    pub fn test_sets(&self) -> &TestSets {
        &self.tests
    }

    pub fn formula(&self) -> SbflFormula {
        self.formula
    }
}
