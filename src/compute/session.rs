//! Top-level repair driver: localization, model building and search.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::edit::{Patcher, SourceTree};
use super::evolution::{EvaluationBackend, EvolutionEngine, FitnessEvaluator, PatchStore, RunContext};
use super::harness::{Compiler, TestHarness};
use super::program::{ModelBuildError, ModelBuilder, ProgramModel};
use super::suspicion::SuspicionScorer;
use crate::schema::{ConfigError, RepairConfig, SearchResult};

/// Errors that terminate a repair run.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    ModelBuild(#[from] ModelBuildError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where the unmodified program sources come from.
#[derive(Debug, Clone)]
pub enum Sources {
    /// Files named by the program model, read relative to a root directory.
    Root(PathBuf),
    InMemory(SourceTree),
}

/// External tools used to validate candidates.
pub struct Toolchain {
    pub patcher: Box<dyn Patcher>,
    pub compiler: Arc<dyn Compiler>,
    pub harness: Arc<dyn TestHarness>,
}

/// A validated repair run, ready to build its search engine.
pub struct RepairSession {
    config: RepairConfig,
    scorer: SuspicionScorer,
    builder: Box<dyn ModelBuilder>,
}

impl RepairSession {
    pub fn new(
        config: RepairConfig,
        scorer: SuspicionScorer,
        builder: Box<dyn ModelBuilder>,
    ) -> Result<Self, RepairError> {
        config.validate()?;
        Ok(Self {
            config,
            scorer,
            builder,
        })
    }

    /// Score the coverage report at `coverage` with the configured formula.
    pub fn from_coverage<P: AsRef<Path>>(
        config: RepairConfig,
        coverage: P,
        builder: Box<dyn ModelBuilder>,
    ) -> Result<Self, RepairError> {
        let scorer = SuspicionScorer::from_file(coverage, config.localization.formula);
        Self::new(config, scorer, builder)
    }

    pub fn config(&self) -> &RepairConfig {
        &self.config
    }

    pub fn scorer(&self) -> &SuspicionScorer {
        &self.scorer
    }

    /// Build the program model and the search engine.
    ///
    /// The returned engine's cancel handle stops the run between evaluations.
    pub fn prepare(&self, toolchain: Toolchain, sources: Sources) -> Result<EvolutionEngine, RepairError> {
        let tests = self.scorer.test_sets();
        if tests.negative.is_empty() {
            return Err(ModelBuildError::NoFailingTests.into());
        }
        let overlap = tests.overlap().len();
        if overlap > 0 {
            return Err(ModelBuildError::OverlappingTests(overlap).into());
        }
        info!(
            "Test suite: {} positive, {} negative tests",
            tests.positive.len(),
            tests.negative.len()
        );

        let localization = &self.config.localization;
        let suspicious = self.scorer.search_suspicious(localization.threshold);
        if suspicious.is_empty() {
            warn!(
                "No location reaches suspiciousness threshold {}",
                localization.threshold
            );
        }

        let mut rng = match self.config.search.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let catalog = self.builder.build(&suspicious)?;
        let model = ProgramModel::new(catalog, localization.max_modification_points, &mut rng)?;

        let sources = match sources {
            Sources::InMemory(tree) => tree,
            Sources::Root(root) => {
                let files = model.points().iter().map(|mp| mp.location.file.clone());
                SourceTree::load(&root, files)?
            }
        };

        let store = match &self.config.output.patch_output_dir {
            Some(dir) => PatchStore::new().with_output_dir(dir)?,
            None => PatchStore::new(),
        };

        let backend = EvaluationBackend {
            sources,
            patcher: toolchain.patcher,
            compiler: toolchain.compiler,
            harness: toolchain.harness,
        };
        let evaluator = FitnessEvaluator::new(model, tests, backend, &self.config, rng.r#gen());

        let mut search = self.config.search.clone();
        search.random_seed = Some(rng.r#gen());
        Ok(EvolutionEngine::new(search, evaluator, RunContext::new(store)))
    }

    /// Run the whole repair (blocking).
    pub fn run(&self, toolchain: Toolchain, sources: Sources) -> Result<SearchResult, RepairError> {
        let mut engine = self.prepare(toolchain, sources)?;
        Ok(engine.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::edit::LinePatcher;
    use crate::compute::harness::{Artifact, CompileFailure, HarnessError};
    use crate::compute::program::CatalogModelBuilder;
    use crate::schema::{CoverageReport, Location, ModificationPoint, StopReason, TestCoverage};
    use std::collections::{BTreeMap, BTreeSet};
    use std::fs;
    use std::time::Duration;

    const SOURCE: &str = "class A {\n  int f(int x) {\n    x = 0;\n    return x + 1;\n  }\n}\n";

    struct MarkingCompiler;

    impl Compiler for MarkingCompiler {
        fn compile(
            &self,
            id: u64,
            sources: &BTreeMap<String, String>,
        ) -> Result<Artifact, CompileFailure> {
            let fixed = sources
                .get("A.java")
                .is_some_and(|s| !s.contains("x = 0;") && s.contains("return"));
            Ok(Artifact {
                id,
                path: PathBuf::from(if fixed { "fixed" } else { "buggy" }),
            })
        }
    }

    struct OracleHarness;

    impl TestHarness for OracleHarness {
        fn run_tests(
            &self,
            artifact: &Artifact,
            tests: &[String],
            _timeout: Duration,
        ) -> Result<BTreeSet<String>, HarnessError> {
            let failing = if artifact.path == PathBuf::from("fixed") {
                "none"
            } else {
                "testNegative"
            };
            Ok(tests.iter().filter(|t| *t == failing).cloned().collect())
        }
    }

    fn coverage(test: &str, passed: bool, lines: &[u32]) -> TestCoverage {
        TestCoverage {
            test: test.to_string(),
            passed,
            covered: lines.iter().map(|&l| Location::new("A.java", l)).collect(),
        }
    }

    fn report() -> CoverageReport {
        CoverageReport {
            tests: vec![
                coverage("testPositive", true, &[2, 4]),
                coverage("testNegative", false, &[2, 3, 4]),
            ],
        }
    }

    fn builder() -> Box<dyn ModelBuilder> {
        let points = [(3, "x = 0;"), (4, "return x + 1;"), (5, "}")]
            .into_iter()
            .map(|(line, stmt)| ModificationPoint::new(Location::new("A.java", line), stmt))
            .collect();
        Box::new(CatalogModelBuilder::new(points))
    }

    fn toolchain() -> Toolchain {
        Toolchain {
            patcher: Box::new(LinePatcher),
            compiler: Arc::new(MarkingCompiler),
            harness: Arc::new(OracleHarness),
        }
    }

    fn config() -> RepairConfig {
        let mut config = RepairConfig::default();
        config.search.population_size = 6;
        config.search.max_generations = 4;
        config.search.random_seed = Some(3);
        config.search.mu = 1.0;
        config
    }

    #[test]
    fn test_session_repairs_seeded_fault() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("A.java"), SOURCE).unwrap();
        let mut config = config();
        config.output.patch_output_dir = Some(dir.path().join("patches"));

        let scorer = SuspicionScorer::new(&report(), config.localization.formula);
        let session = RepairSession::new(config, scorer, builder()).unwrap();
        let result = session
            .run(toolchain(), Sources::Root(dir.path().to_path_buf()))
            .unwrap();

        assert_eq!(result.stats.stop_reason, StopReason::MaxEvaluations);
        assert_eq!(result.stats.total_evaluations, 24);
        assert!(!result.patches.is_empty());

        let saved = PatchStore::load_records(dir.path().join("patches")).unwrap();
        assert_eq!(saved.len(), result.patches.len());
        assert!(
            saved[0]
                .edits
                .iter()
                .any(|e| e.location == Location::new("A.java", 3))
        );
    }

    #[test]
    fn test_missing_fault_signal_is_fatal() {
        let report = CoverageReport {
            tests: vec![coverage("testPositive", true, &[2, 3])],
        };
        let scorer = SuspicionScorer::new(&report, Default::default());
        let session = RepairSession::new(config(), scorer, builder()).unwrap();
        let tree = SourceTree::from_files([("A.java".to_string(), SOURCE.to_string())].into());

        assert!(matches!(
            session.prepare(toolchain(), Sources::InMemory(tree)),
            Err(RepairError::ModelBuild(ModelBuildError::NoFailingTests))
        ));
    }

    #[test]
    fn test_unsuspicious_catalog_is_fatal() {
        let config = config();
        let scorer = SuspicionScorer::new(&report(), config.localization.formula);
        // Line 5 is never executed by the failing test.
        let builder = Box::new(CatalogModelBuilder::new(vec![ModificationPoint::new(
            Location::new("A.java", 5),
            "}",
        )]));
        let session = RepairSession::new(config, scorer, builder).unwrap();
        let tree = SourceTree::from_files([("A.java".to_string(), SOURCE.to_string())].into());

        assert!(matches!(
            session.prepare(toolchain(), Sources::InMemory(tree)),
            Err(RepairError::ModelBuild(ModelBuildError::NoModificationPoints))
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = config();
        config.search.population_size = 1;
        let scorer = SuspicionScorer::new(&report(), config.localization.formula);
        assert!(matches!(
            RepairSession::new(config, scorer, builder()),
            Err(RepairError::Config(_))
        ));
    }

    #[test]
    fn test_unreadable_coverage_degrades_to_no_signal() {
        let session =
            RepairSession::from_coverage(config(), "/nonexistent/coverage.json", builder()).unwrap();
        assert!(session.scorer().scores().is_empty());
        assert!(session.scorer().test_sets().negative.is_empty());
    }
}
