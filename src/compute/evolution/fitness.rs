//! Candidate evaluation: decode, filter, patch, compile, test and score.
//!
//! Every per-candidate failure is absorbed into the returned objective
//! vector so the search loop never stops on a single bad candidate.
//!
//! # Objective layouts
//!
//! All objectives are minimized. `edits` is the number of applied edits,
//! `fitness` is `weight * failed_pos / ran_pos + failed_neg / ran_neg` and
//! `novelty` is the k-NN novelty score.
//!
//! | objectives | `none` / `lightweight`              | `full`                        |
//! |------------|-------------------------------------|-------------------------------|
//! | 1          | `[fitness]`                         | `[-novelty]`                  |
//! | 2          | `[edits, fitness]`                  | `[edits, -novelty]`           |
//! | 3          | `[edits, ratio_pos, ratio_neg]`     | `[edits, -novelty, fitness]`  |
//!
//! In `lightweight` mode `fitness` is reduced by `(1 - novelty) * diversity_weight`;
//! the three-objective layout carries the unadjusted ratios. A candidate that
//! could not be evaluated gets [`SENTINEL`] in every slot.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};
use rand::prelude::*;

use super::context::RunContext;
use super::genome::Chromosome;
use super::novelty::{BehaviorArchive, BehaviorDescriptor, NoveltyError};
use crate::compute::edit::{EditScript, PatchError, Patcher, SourceTree};
use crate::compute::harness::{
    BuildError, Compiler, TestHarness, TestOutcome, TestRequest, build, execute,
};
use crate::compute::program::{EditFilter, FilterVerdict, ProgramModel, RedundantEditFilter};
use crate::schema::{
    EvaluationConfig, Location, NoveltyConfig, NoveltyMode, Operator, PatchEdit, RecordedEdit,
    RepairConfig, TestSets,
};

/// "Could not be evaluated".
pub const SENTINEL: f64 = f64::MAX;

/// Maximum number of objectives.
pub const MAX_OBJECTIVES: usize = 3;

/// Fixed-capacity objective vector. See the module docs for layouts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectiveVector {
    values: [f64; MAX_OBJECTIVES],
    len: usize,
}

impl ObjectiveVector {
    pub fn new(values: &[f64]) -> Self {
        let len = values.len().min(MAX_OBJECTIVES);
        let mut slots = [0.0; MAX_OBJECTIVES];
        slots[..len].copy_from_slice(&values[..len]);
        Self { values: slots, len }
    }

    pub fn sentinel(len: usize) -> Self {
        Self {
            values: [SENTINEL; MAX_OBJECTIVES],
            len: len.min(MAX_OBJECTIVES),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values[..self.len]
    }

    pub fn get(&self, i: usize) -> f64 {
        self.as_slice()[i]
    }

    pub fn is_sentinel(&self) -> bool {
        self.as_slice().iter().all(|&v| v == SENTINEL)
    }

    /// Pareto dominance for minimization.
    pub fn dominates(&self, other: &Self) -> bool {
        let pairs = || self.as_slice().iter().zip(other.as_slice());
        pairs().all(|(a, b)| a <= b) && pairs().any(|(a, b)| a < b)
    }
}

/// Terminal state of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationStatus {
    /// No point survived selection, filtering and budgeting.
    NoActiveEdits,
    /// The patcher could not produce or render an edit.
    PatchFailed,
    CompileFailed,
    /// Compiler or test timeout, crash or harness error.
    Exceptional,
    /// Tests ran but full novelty could not score the behavior.
    NoveltyUnavailable,
    /// The sampled run passed but the full positive re-check failed.
    ConfirmationRejected,
    /// Tests ran to completion; `adequate` when nothing failed.
    Evaluated { adequate: bool },
}

impl EvaluationStatus {
    pub fn is_adequate(&self) -> bool {
        matches!(self, Self::Evaluated { adequate: true })
    }
}

/// One edit that survived decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedEdit {
    /// Modification point index.
    pub point: usize,
    pub operator_index: usize,
    pub operator: Operator,
    pub ingredient_index: Option<usize>,
    pub location: Location,
    pub statement: String,
    pub ingredient: Option<String>,
}

impl AppliedEdit {
    pub fn patch_edit(&self) -> PatchEdit {
        PatchEdit {
            operator_index: self.operator_index,
            location: self.location.clone(),
            ingredient_index: self.ingredient_index,
        }
    }

    pub fn recorded(&self) -> RecordedEdit {
        RecordedEdit {
            operator: self.operator,
            location: self.location.clone(),
            statement: self.statement.clone(),
            ingredient: self.ingredient.clone(),
        }
    }
}

/// Result of evaluating one candidate.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub id: u64,
    pub objectives: ObjectiveVector,
    pub status: EvaluationStatus,
    /// Number of applied edits.
    pub edits: usize,
    /// Unadjusted weighted failure rate, when tests ran.
    pub fitness: Option<f64>,
    pub novelty: Option<f64>,
    /// Id of the patch recorded by this evaluation.
    pub patch_id: Option<u64>,
}

/// External collaborators used to validate candidates.
pub struct EvaluationBackend {
    pub sources: SourceTree,
    pub patcher: Box<dyn Patcher>,
    pub compiler: Arc<dyn Compiler>,
    pub harness: Arc<dyn TestHarness>,
}

/// Evaluates candidates against the program model and the test suite.
pub struct FitnessEvaluator {
    model: ProgramModel,
    positive: Vec<String>,
    negative: Vec<String>,
    ordered_tests: Vec<String>,
    config: EvaluationConfig,
    novelty: NoveltyConfig,
    objectives: usize,
    backend: EvaluationBackend,
    filter: Option<Box<dyn EditFilter>>,
    archive: BehaviorArchive,
    rng: StdRng,
}

impl FitnessEvaluator {
    pub fn new(
        model: ProgramModel,
        tests: &TestSets,
        backend: EvaluationBackend,
        config: &RepairConfig,
        seed: u64,
    ) -> Self {
        let filter: Option<Box<dyn EditFilter>> = if config.evaluation.filter_rules {
            Some(Box::new(RedundantEditFilter))
        } else {
            None
        };
        Self {
            model,
            positive: tests.positive.iter().cloned().collect(),
            negative: tests.negative.iter().cloned().collect(),
            ordered_tests: tests.ordered(),
            config: config.evaluation.clone(),
            novelty: config.novelty.clone(),
            objectives: config.search.number_of_objectives,
            backend,
            filter,
            archive: BehaviorArchive::new(config.novelty.archive_size),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn model(&self) -> &ProgramModel {
        &self.model
    }

    pub fn archive(&self) -> &BehaviorArchive {
        &self.archive
    }

    pub fn number_of_objectives(&self) -> usize {
        self.objectives
    }

    /// Evaluate a candidate.
    ///
    /// Points deactivated by filtering or budgeting are cleared in
    /// `chromosome`, and redirected ingredients are written back.
    pub fn evaluate(&mut self, chromosome: &mut Chromosome, ctx: &mut RunContext) -> Evaluation {
        let id = ctx.begin_evaluation();
        let selected = self.select(chromosome);
        let edits = selected.len();
        let objective_count = self.objectives;
        let terminal = |status| Evaluation {
            id,
            objectives: ObjectiveVector::sentinel(objective_count),
            status,
            edits,
            fitness: None,
            novelty: None,
            patch_id: None,
        };

        if selected.is_empty() {
            debug!("Evaluation {id}: no active edits");
            return terminal(EvaluationStatus::NoActiveEdits);
        }

        let sources = match self.apply(&selected) {
            Ok(sources) => sources,
            Err(e) => {
                debug!("Evaluation {id}: patching failed: {e}");
                return terminal(EvaluationStatus::PatchFailed);
            }
        };

        let compile_timeout = self.config.compile_timeout();
        let artifact = match build(&self.backend.compiler, id, sources, compile_timeout) {
            Ok(artifact) => artifact,
            Err(BuildError::Failed(failure)) => {
                debug!("Evaluation {id}: {failure}");
                return terminal(EvaluationStatus::CompileFailed);
            }
            Err(e @ BuildError::Interrupted(_)) => {
                warn!("Evaluation {id}: {e}");
                return terminal(EvaluationStatus::Exceptional);
            }
        };

        let sample = self.sample_positive();
        let sampled = sample.len() < self.positive.len();
        let request = TestRequest::new(sample, self.negative.clone());
        let timeout = self.config.wait_time();
        let mut outcome = execute(&self.backend.harness, &artifact, &request, timeout);
        if outcome.exceptional {
            debug!("Evaluation {id}: exceptional test run");
            return terminal(EvaluationStatus::Exceptional);
        }

        let mut status = EvaluationStatus::Evaluated {
            adequate: outcome.all_passed(),
        };
        if sampled && outcome.all_passed() {
            let full = TestRequest::new(self.positive.clone(), self.negative.clone());
            outcome = execute(&self.backend.harness, &artifact, &full, timeout);
            if outcome.exceptional {
                warn!("Evaluation {id}: full re-check of a passing sample did not complete");
                return terminal(EvaluationStatus::Exceptional);
            }
            if !outcome.all_passed() {
                info!(
                    "Evaluation {id}: sample passed but {} positive tests failed the full re-check",
                    outcome.failed_positive
                );
                status = EvaluationStatus::ConfirmationRejected;
            }
        }

        let (objectives, fitness, novelty) = self.score(edits, &outcome);
        if self.novelty.mode == NoveltyMode::Full && novelty.is_none() {
            status = EvaluationStatus::NoveltyUnavailable;
        }
        let patch_id = if status.is_adequate() {
            ctx.accept(&selected)
        } else {
            None
        };
        debug!(
            "Evaluation {id}: {edits} edits, fitness {fitness:.4}, objectives {:?}",
            objectives.as_slice()
        );

        Evaluation {
            id,
            objectives,
            status,
            edits,
            fitness: Some(fitness),
            novelty,
            patch_id,
        }
    }

    /// Decode the active points, apply the filter rule and the edit budget.
    fn select(&self, chromosome: &mut Chromosome) -> Vec<AppliedEdit> {
        let points = self.model.points();
        let mut selected = Vec::new();

        for i in 0..chromosome.len().min(points.len()) {
            if !chromosome.active[i] {
                continue;
            }
            let point = &points[i];
            if point.operators.is_empty() {
                chromosome.active[i] = false;
                continue;
            }
            let operator_index = chromosome.operator_index[i] % point.num_operators();
            let operator = point.operators[operator_index];

            let mut ingredient_index = None;
            if operator.requires_ingredient() {
                if point.ingredients.is_empty() {
                    chromosome.active[i] = false;
                    continue;
                }
                ingredient_index = Some(chromosome.ingredient_index[i] % point.num_ingredients());
            }

            if let Some(filter) = &self.filter {
                let encoded = ingredient_index.map(|j| (j, &point.ingredients[j]));
                match filter.check(operator, point, encoded) {
                    FilterVerdict::Accept => {}
                    FilterVerdict::Redirect(j) => {
                        chromosome.ingredient_index[i] = j;
                        ingredient_index = Some(j);
                    }
                    FilterVerdict::Reject => {
                        chromosome.active[i] = false;
                        continue;
                    }
                }
            }

            selected.push(AppliedEdit {
                point: i,
                operator_index,
                operator,
                ingredient_index,
                location: point.location.clone(),
                statement: point.statement.clone(),
                ingredient: ingredient_index.map(|j| point.ingredients[j].source.clone()),
            });
        }

        if let Some(max) = self.config.max_edits
            && selected.len() > max
        {
            selected.sort_by(|a, b| {
                points[b.point]
                    .suspiciousness
                    .total_cmp(&points[a.point].suspiciousness)
                    .then(a.point.cmp(&b.point))
            });
            for dropped in selected.drain(max..) {
                chromosome.active[dropped.point] = false;
            }
            selected.sort_by_key(|e| e.point);
        }

        selected
    }

    fn apply(&self, selected: &[AppliedEdit]) -> Result<BTreeMap<String, String>, PatchError> {
        let points = self.model.points();
        let mut script = EditScript::new();
        for edit in selected {
            let point = &points[edit.point];
            let ingredient = edit.ingredient_index.map(|j| &point.ingredients[j]);
            script.push(self.backend.patcher.edit(point, edit.operator, ingredient)?);
        }
        script.render(&self.backend.sources)
    }

    /// At least one positive test when sampling, never more than all of them.
    fn sample_positive(&mut self) -> Vec<String> {
        if !self.config.samples_positive() {
            return self.positive.clone();
        }
        let total = self.positive.len();
        let num = ((total as f64 * self.config.percentage).floor() as usize)
            .max(1)
            .min(total);
        let mut sample = self.positive.clone();
        sample.shuffle(&mut self.rng);
        sample.truncate(num);
        sample.sort();
        sample
    }

    fn score(
        &mut self,
        edits: usize,
        outcome: &TestOutcome,
    ) -> (ObjectiveVector, f64, Option<f64>) {
        let ratio = |failed: usize, ran: usize| {
            if ran == 0 {
                0.0
            } else {
                failed as f64 / ran as f64
            }
        };
        let ratio_pos = ratio(outcome.failed_positive, outcome.ran_positive);
        let ratio_neg = ratio(outcome.failed_negative, outcome.ran_negative);
        let fitness = self.config.weight * ratio_pos + ratio_neg;
        let edits = edits as f64;
        let objective_count = self.objectives;

        let standard = |fitness: f64| match objective_count {
            1 => ObjectiveVector::new(&[fitness]),
            2 => ObjectiveVector::new(&[edits, fitness]),
            _ => ObjectiveVector::new(&[edits, ratio_pos, ratio_neg]),
        };

        match self.novelty.mode {
            NoveltyMode::None => (standard(fitness), fitness, None),
            NoveltyMode::Lightweight => match self.novelty_score(outcome) {
                Ok(novelty) => {
                    let bonus = (1.0 - novelty) * self.novelty.diversity_weight;
                    (standard(fitness - bonus), fitness, Some(novelty))
                }
                Err(e) => {
                    warn!("Novelty unavailable, using base fitness: {e}");
                    (standard(fitness), fitness, None)
                }
            },
            NoveltyMode::Full => match self.novelty_score(outcome) {
                Ok(novelty) => {
                    let objectives = match self.objectives {
                        1 => ObjectiveVector::new(&[-novelty]),
                        2 => ObjectiveVector::new(&[edits, -novelty]),
                        _ => ObjectiveVector::new(&[edits, -novelty, fitness]),
                    };
                    (objectives, fitness, Some(novelty))
                }
                Err(e) => {
                    warn!("Novelty unavailable, assigning sentinel: {e}");
                    (ObjectiveVector::sentinel(self.objectives), fitness, None)
                }
            },
        }
    }

    /// Score the outcome's descriptor against the archive, then archive it.
    fn novelty_score(&mut self, outcome: &TestOutcome) -> Result<f64, NoveltyError> {
        let descriptor = BehaviorDescriptor::from_outcomes(&self.ordered_tests, &outcome.failed);
        let score = self
            .archive
            .novelty_score(&descriptor, self.novelty.k_neighbors)?;
        self.archive.insert(descriptor, &mut self.rng);
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::edit::LinePatcher;
    use crate::compute::evolution::PatchStore;
    use crate::compute::harness::{Artifact, CompileFailure, HarnessError};
    use crate::schema::{Ingredient, ModificationPoint};
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    const SOURCE: &str = "class A {\n  int x = 0;\n  x++;\n  x--;\n  return x;\n}\n";

    #[derive(Clone, Copy)]
    enum Build {
        Succeeds,
        Fails,
        Stalls(Duration),
    }

    struct CountingCompiler {
        calls: Arc<AtomicUsize>,
        build: Build,
    }

    impl Compiler for CountingCompiler {
        fn compile(
            &self,
            id: u64,
            _sources: &BTreeMap<String, String>,
        ) -> Result<Artifact, CompileFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.build {
                Build::Succeeds => {}
                Build::Fails => {
                    return Err(CompileFailure::new(vec!["A.java:3: error".to_string()]));
                }
                Build::Stalls(delay) => thread::sleep(delay),
            }
            Ok(Artifact {
                id,
                path: PathBuf::from(format!("bin_{id}")),
            })
        }
    }

    type Rule = Box<dyn Fn(&[String]) -> BTreeSet<String> + Send + Sync>;

    struct ScriptedHarness {
        calls: Arc<AtomicUsize>,
        delay: Duration,
        rule: Rule,
    }

    impl TestHarness for ScriptedHarness {
        fn run_tests(
            &self,
            _artifact: &Artifact,
            tests: &[String],
            _timeout: Duration,
        ) -> Result<BTreeSet<String>, HarnessError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            Ok((self.rule)(tests))
        }
    }

    struct Fixture {
        compiles: Arc<AtomicUsize>,
        runs: Arc<AtomicUsize>,
        evaluator: FitnessEvaluator,
        ctx: RunContext,
    }

    fn fails(names: &'static [&'static str]) -> Rule {
        Box::new(move |tests: &[String]| {
            tests
                .iter()
                .filter(|t| names.contains(&t.as_str()))
                .cloned()
                .collect()
        })
    }

    fn points() -> Vec<ModificationPoint> {
        let ingredient = |id, source: &str| Ingredient {
            id,
            source: source.to_string(),
        };
        vec![
            ModificationPoint::new(Location::new("A.java", 3), "x++;")
                .with_ingredients(vec![ingredient(1, "x++;"), ingredient(2, "x += 2;")])
                .with_suspiciousness(0.2),
            ModificationPoint::new(Location::new("A.java", 4), "x--;")
                .with_ingredients(vec![ingredient(3, "x = 1;")])
                .with_suspiciousness(0.9),
            ModificationPoint::new(Location::new("A.java", 2), "int x = 0;")
                .with_suspiciousness(0.5),
        ]
    }

    fn fixture(
        config: RepairConfig,
        positive: &[&str],
        rule: Rule,
        delay: Duration,
        build: Build,
    ) -> Fixture {
        let tests = TestSets::new(
            positive.iter().map(|s| s.to_string()).collect(),
            ["n1".to_string()].into(),
        );
        fixture_with(config, &tests, rule, delay, build)
    }

    fn fixture_with(
        config: RepairConfig,
        tests: &TestSets,
        rule: Rule,
        delay: Duration,
        build: Build,
    ) -> Fixture {
        let compiles = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let mut rng = StdRng::seed_from_u64(0);
        let model = ProgramModel::new(points(), 40, &mut rng).unwrap();
        let backend = EvaluationBackend {
            sources: SourceTree::from_files([("A.java".to_string(), SOURCE.to_string())].into()),
            patcher: Box::new(LinePatcher),
            compiler: Arc::new(CountingCompiler {
                calls: Arc::clone(&compiles),
                build,
            }),
            harness: Arc::new(ScriptedHarness {
                calls: Arc::clone(&runs),
                delay,
                rule,
            }),
        };
        Fixture {
            compiles,
            runs,
            evaluator: FitnessEvaluator::new(model, tests, backend, &config, 1),
            ctx: RunContext::new(PatchStore::new()),
        }
    }

    fn simple(config: RepairConfig, rule: Rule) -> Fixture {
        fixture(config, &["p1", "p2"], rule, Duration::ZERO, Build::Succeeds)
    }

    /// Delete the statement at point 1 (`Delete` is operator 0).
    fn delete_point_one() -> Chromosome {
        let mut c = Chromosome::empty(3);
        c.active[1] = true;
        c
    }

    #[test]
    fn test_no_active_edits_never_compiles() {
        let mut f = simple(RepairConfig::default(), fails(&[]));
        let mut c = Chromosome::empty(3);
        let eval = f.evaluator.evaluate(&mut c, &mut f.ctx);

        assert_eq!(eval.status, EvaluationStatus::NoActiveEdits);
        assert!(eval.objectives.is_sentinel());
        assert_eq!(eval.objectives.len(), 2);
        assert_eq!(f.compiles.load(Ordering::SeqCst), 0);
        assert_eq!(f.runs.load(Ordering::SeqCst), 0);
        assert_eq!(f.ctx.evaluations(), 1);
    }

    #[test]
    fn test_timeout_yields_sentinel() {
        let mut config = RepairConfig::default();
        config.evaluation.wait_time_ms = 20;
        let mut f = fixture(
            config,
            &["p1"],
            fails(&[]),
            Duration::from_millis(400),
            Build::Succeeds,
        );
        let eval = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);

        assert_eq!(eval.status, EvaluationStatus::Exceptional);
        assert!(eval.objectives.is_sentinel());
        assert!(eval.objectives.as_slice().iter().all(|&v| v == SENTINEL));
        assert!(f.ctx.patches().is_empty());
    }

    #[test]
    fn test_compile_failure_skips_tests() {
        let mut f = fixture(
            RepairConfig::default(),
            &["p1"],
            fails(&[]),
            Duration::ZERO,
            Build::Fails,
        );
        let eval = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);
        assert_eq!(eval.status, EvaluationStatus::CompileFailed);
        assert!(eval.objectives.is_sentinel());
        assert_eq!(f.compiles.load(Ordering::SeqCst), 1);
        assert_eq!(f.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_adequate_patch_is_recorded_once() {
        let mut f = simple(RepairConfig::default(), fails(&[]));
        let first = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);
        assert_eq!(first.status, EvaluationStatus::Evaluated { adequate: true });
        assert_eq!(first.objectives.as_slice(), &[1.0, 0.0]);
        assert_eq!(first.patch_id, Some(0));

        let second = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);
        assert!(second.status.is_adequate());
        assert_eq!(second.patch_id, None);
        assert_eq!(f.ctx.patches().len(), 1);
        assert_eq!(f.ctx.patches().records()[0].locations, vec![1]);
    }

    #[test]
    fn test_weighted_fitness_layouts() {
        let mut f = simple(RepairConfig::default(), fails(&["p1", "n1"]));
        let eval = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);
        assert_eq!(eval.status, EvaluationStatus::Evaluated { adequate: false });
        assert_eq!(eval.fitness, Some(1.25));
        assert_eq!(eval.objectives.as_slice(), &[1.0, 1.25]);

        let mut config = RepairConfig::default();
        config.search.number_of_objectives = 3;
        let mut f = simple(config, fails(&["p1", "n1"]));
        let eval = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);
        assert_eq!(eval.objectives.as_slice(), &[1.0, 0.5, 1.0]);

        let mut config = RepairConfig::default();
        config.search.number_of_objectives = 1;
        let mut f = simple(config, fails(&["p1", "n1"]));
        let eval = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);
        assert_eq!(eval.objectives.as_slice(), &[1.25]);
    }

    #[test]
    fn test_edit_budget_keeps_most_suspicious() {
        let mut config = RepairConfig::default();
        config.evaluation.max_edits = Some(1);
        let mut f = simple(config, fails(&[]));
        let mut c = Chromosome::empty(3);
        c.active = vec![true, true, true];

        let eval = f.evaluator.evaluate(&mut c, &mut f.ctx);
        assert_eq!(eval.edits, 1);
        assert_eq!(c.active, vec![false, true, false]);
    }

    #[test]
    fn test_identical_ingredient_is_redirected() {
        let mut f = simple(RepairConfig::default(), fails(&[]));
        let mut c = Chromosome::empty(3);
        c.active[0] = true;
        c.operator_index[0] = 1; // Replace
        c.ingredient_index[0] = 0; // "x++;" is the statement itself

        let eval = f.evaluator.evaluate(&mut c, &mut f.ctx);
        assert_eq!(c.ingredient_index[0], 1);
        let record = &f.ctx.patches().records()[0];
        assert_eq!(record.ingredients, vec![Some(1)]);
        assert_eq!(record.edits[0].ingredient.as_deref(), Some("x += 2;"));
        assert!(eval.status.is_adequate());
    }

    #[test]
    fn test_full_novelty_objective() {
        let mut config = RepairConfig::default();
        config.novelty.mode = NoveltyMode::Full;
        let mut f = simple(config, fails(&["n1"]));

        let first = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);
        assert_eq!(first.novelty, Some(1.0));
        assert_eq!(first.objectives.as_slice(), &[1.0, -1.0]);
        assert_eq!(f.evaluator.archive().len(), 1);

        let second = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);
        assert_eq!(second.novelty, Some(0.0));
        assert_eq!(second.objectives.get(1), 0.0);
    }

    #[test]
    fn test_lightweight_diversity_bonus() {
        let mut config = RepairConfig::default();
        config.novelty.mode = NoveltyMode::Lightweight;
        let mut f = simple(config, fails(&["n1"]));

        let first = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);
        assert_eq!(first.objectives.as_slice(), &[1.0, 1.0]);

        let second = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);
        assert!((second.objectives.get(1) - 0.7).abs() < 1e-12);
        assert_eq!(second.fitness, Some(1.0));
    }

    #[test]
    fn test_sampled_pass_rejected_by_full_recheck() {
        let mut config = RepairConfig::default();
        config.evaluation.percentage = 0.5;
        // Only the full run (4 positive + 1 negative) sees p4 fail.
        let rule: Rule = Box::new(|tests: &[String]| {
            if tests.len() > 3 {
                ["p4".to_string()].into()
            } else {
                BTreeSet::new()
            }
        });
        let mut f = fixture(config, &["p1", "p2", "p3", "p4"], rule, Duration::ZERO, Build::Succeeds);
        let eval = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);

        assert_eq!(eval.status, EvaluationStatus::ConfirmationRejected);
        assert_eq!(f.runs.load(Ordering::SeqCst), 2);
        assert_eq!(eval.fitness, Some(0.5 * 0.25));
        assert!(f.ctx.patches().is_empty());
    }

    #[test]
    fn test_sampled_pass_confirmed() {
        let mut config = RepairConfig::default();
        config.evaluation.percentage = 0.5;
        let mut f = fixture(
            config,
            &["p1", "p2", "p3", "p4"],
            fails(&[]),
            Duration::ZERO,
            Build::Succeeds,
        );
        let eval = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);
        assert!(eval.status.is_adequate());
        assert_eq!(f.runs.load(Ordering::SeqCst), 2);
        assert_eq!(eval.patch_id, Some(0));
    }

    #[test]
    fn test_stalled_compile_yields_sentinel() {
        let mut config = RepairConfig::default();
        config.evaluation.compile_timeout_ms = 20;
        let mut f = fixture(
            config,
            &["p1"],
            fails(&[]),
            Duration::ZERO,
            Build::Stalls(Duration::from_millis(1500)),
        );
        let started = std::time::Instant::now();
        let eval = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);

        assert!(started.elapsed() < Duration::from_millis(1000));
        assert_eq!(eval.status, EvaluationStatus::Exceptional);
        assert!(eval.objectives.is_sentinel());
        assert_eq!(f.compiles.load(Ordering::SeqCst), 1);
        assert_eq!(f.runs.load(Ordering::SeqCst), 0);
        assert!(f.ctx.patches().is_empty());
    }

    #[test]
    fn test_lightweight_without_tests_keeps_base_fitness() {
        let mut config = RepairConfig::default();
        config.novelty.mode = NoveltyMode::Lightweight;
        let empty = TestSets::new(BTreeSet::new(), BTreeSet::new());
        let mut f = fixture_with(config, &empty, fails(&[]), Duration::ZERO, Build::Succeeds);
        let eval = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);

        assert_eq!(eval.novelty, None);
        assert_eq!(eval.objectives.as_slice(), &[1.0, 0.0]);
        assert!(eval.status.is_adequate());
        assert_eq!(eval.patch_id, Some(0));
        assert!(f.evaluator.archive().is_empty());
    }

    #[test]
    fn test_full_novelty_without_tests_records_nothing() {
        let mut config = RepairConfig::default();
        config.novelty.mode = NoveltyMode::Full;
        let empty = TestSets::new(BTreeSet::new(), BTreeSet::new());
        let mut f = fixture_with(config, &empty, fails(&[]), Duration::ZERO, Build::Succeeds);
        let eval = f.evaluator.evaluate(&mut delete_point_one(), &mut f.ctx);

        assert_eq!(eval.status, EvaluationStatus::NoveltyUnavailable);
        assert!(!eval.status.is_adequate());
        assert!(eval.objectives.is_sentinel());
        assert_eq!(eval.novelty, None);
        assert_eq!(eval.patch_id, None);
        assert!(f.ctx.patches().is_empty());
    }

    #[test]
    fn test_dominance() {
        let a = ObjectiveVector::new(&[1.0, 0.5]);
        let b = ObjectiveVector::new(&[2.0, 0.5]);
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
        assert!(!a.dominates(&a));
        assert!(a.dominates(&ObjectiveVector::sentinel(2)));
    }
}
