//! Compiler and test-harness contracts.
//!
//! Both collaborators are external: the engine only needs an artifact (or
//! diagnostics) from the compiler and a set of failed tests (or an exceptional
//! flag) from the harness. `build` and `execute` run each call inside the
//! deadline sandbox; `execute` also splits failures into positive and
//! negative counts.

mod process;
mod sandbox;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::warn;

pub use process::{CommandCompiler, CommandTestHarness, MAX_INLINE_TESTS};
pub use sandbox::{SandboxError, run_with_deadline};

/// Handle to a compiled program variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Evaluation id the artifact was built for.
    pub id: u64,
    /// Build output location.
    pub path: PathBuf,
}

/// Compilation failed; the candidate gets the sentinel.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Compilation failed with {} diagnostics", .diagnostics.len())]
pub struct CompileFailure {
    pub diagnostics: Vec<String>,
}

impl CompileFailure {
    pub fn new(diagnostics: Vec<String>) -> Self {
        Self { diagnostics }
    }
}

/// Builds an artifact from the edited files of one candidate.
pub trait Compiler: Send + Sync {
    /// `sources` holds only the files the candidate edited.
    fn compile(&self, id: u64, sources: &BTreeMap<String, String>)
    -> Result<Artifact, CompileFailure>;
}

/// Why `build` produced no artifact.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Failed(#[from] CompileFailure),
    /// The compiler overran its deadline or crashed.
    #[error("Compiler did not finish: {0}")]
    Interrupted(#[from] SandboxError),
}

/// Harness failures. Every variant makes the outcome exceptional.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("No tests requested")]
    NoTests,
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Test run exceeded {0:?}")]
    Timeout(Duration),
    #[error("Test command exited with {}", .code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    ExitStatus { code: Option<i32> },
    #[error("Malformed harness output: {0}")]
    MalformedOutput(String),
}

/// Runs tests against an artifact.
pub trait TestHarness: Send + Sync {
    /// Run `tests` and return the ids of those that failed.
    fn run_tests(
        &self,
        artifact: &Artifact,
        tests: &[String],
        timeout: Duration,
    ) -> Result<BTreeSet<String>, HarnessError>;
}

/// Positive and negative tests to run for one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestRequest {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

impl TestRequest {
    pub fn new(positive: Vec<String>, negative: Vec<String>) -> Self {
        Self { positive, negative }
    }

    pub fn len(&self) -> usize {
        self.positive.len() + self.negative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }

    fn all(&self) -> Vec<String> {
        self.positive.iter().chain(&self.negative).cloned().collect()
    }
}

/// Result of one harness call.
///
/// Failure counts are not meaningful when `exceptional` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestOutcome {
    pub failed: BTreeSet<String>,
    pub failed_positive: usize,
    pub failed_negative: usize,
    pub ran_positive: usize,
    pub ran_negative: usize,
    pub exceptional: bool,
}

impl TestOutcome {
    pub fn exceptional(request: &TestRequest) -> Self {
        Self {
            ran_positive: request.positive.len(),
            ran_negative: request.negative.len(),
            exceptional: true,
            ..Default::default()
        }
    }

    fn from_failed(request: &TestRequest, failed: BTreeSet<String>) -> Self {
        let count = |tests: &[String]| tests.iter().filter(|t| failed.contains(*t)).count();
        Self {
            failed_positive: count(&request.positive),
            failed_negative: count(&request.negative),
            ran_positive: request.positive.len(),
            ran_negative: request.negative.len(),
            failed,
            exceptional: false,
        }
    }

    /// Ran to completion with zero failures.
    pub fn all_passed(&self) -> bool {
        !self.exceptional && self.failed_positive == 0 && self.failed_negative == 0
    }
}

/// Run a request under a hard deadline.
///
/// Timeouts, worker panics and harness errors all yield an exceptional
/// outcome; output of a cancelled run is discarded.
pub fn execute(
    harness: &Arc<dyn TestHarness>,
    artifact: &Artifact,
    request: &TestRequest,
    timeout: Duration,
) -> TestOutcome {
    let worker = Arc::clone(harness);
    let worker_artifact = artifact.clone();
    let tests = request.all();

    match run_with_deadline(timeout, move || {
        worker.run_tests(&worker_artifact, &tests, timeout)
    }) {
        Ok(Ok(failed)) => TestOutcome::from_failed(request, failed),
        Ok(Err(e)) => {
            warn!("Evaluation {}: test harness failed: {e}", artifact.id);
            TestOutcome::exceptional(request)
        }
        Err(e) => {
            warn!("Evaluation {}: {e}", artifact.id);
            TestOutcome::exceptional(request)
        }
    }
}

/// Compile `sources` on a worker thread, waiting at most `timeout`.
pub fn build(
    compiler: &Arc<dyn Compiler>,
    id: u64,
    sources: BTreeMap<String, String>,
    timeout: Duration,
) -> Result<Artifact, BuildError> {
    let worker = Arc::clone(compiler);
    Ok(run_with_deadline(timeout, move || worker.compile(id, &sources))??)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    struct SlowCompiler {
        delay: Duration,
    }

    impl Compiler for SlowCompiler {
        fn compile(
            &self,
            id: u64,
            sources: &BTreeMap<String, String>,
        ) -> Result<Artifact, CompileFailure> {
            thread::sleep(self.delay);
            if sources.is_empty() {
                return Err(CompileFailure::new(vec!["nothing to build".to_string()]));
            }
            Ok(Artifact {
                id,
                path: PathBuf::from(format!("bin_{id}")),
            })
        }
    }

    fn sources() -> BTreeMap<String, String> {
        [("A.java".to_string(), "class A {}\n".to_string())].into()
    }

    struct FixedHarness {
        failed: Vec<&'static str>,
        delay: Duration,
    }

    impl TestHarness for FixedHarness {
        fn run_tests(
            &self,
            _artifact: &Artifact,
            tests: &[String],
            _timeout: Duration,
        ) -> Result<BTreeSet<String>, HarnessError> {
            thread::sleep(self.delay);
            Ok(tests
                .iter()
                .filter(|t| self.failed.contains(&t.as_str()))
                .cloned()
                .collect())
        }
    }

    fn artifact() -> Artifact {
        Artifact {
            id: 1,
            path: PathBuf::from("bin_1"),
        }
    }

    fn request() -> TestRequest {
        TestRequest::new(
            vec!["p1".to_string(), "p2".to_string()],
            vec!["n1".to_string()],
        )
    }

    #[test]
    fn test_outcome_splits_failures() {
        let harness: Arc<dyn TestHarness> = Arc::new(FixedHarness {
            failed: vec!["p2", "n1", "unrelated"],
            delay: Duration::ZERO,
        });
        let outcome = execute(&harness, &artifact(), &request(), Duration::from_secs(5));
        assert!(!outcome.exceptional);
        assert_eq!(outcome.failed_positive, 1);
        assert_eq!(outcome.failed_negative, 1);
        assert_eq!(outcome.ran_positive, 2);
        assert!(!outcome.all_passed());
    }

    #[test]
    fn test_timeout_is_exceptional() {
        let harness: Arc<dyn TestHarness> = Arc::new(FixedHarness {
            failed: Vec::new(),
            delay: Duration::from_millis(500),
        });
        let outcome = execute(&harness, &artifact(), &request(), Duration::from_millis(20));
        assert!(outcome.exceptional);
        assert!(outcome.failed.is_empty());
        assert!(!outcome.all_passed());
    }

    #[test]
    fn test_all_passed() {
        let harness: Arc<dyn TestHarness> = Arc::new(FixedHarness {
            failed: Vec::new(),
            delay: Duration::ZERO,
        });
        let outcome = execute(&harness, &artifact(), &request(), Duration::from_secs(5));
        assert!(outcome.all_passed());
    }

    #[test]
    fn test_build_within_deadline() {
        let compiler: Arc<dyn Compiler> = Arc::new(SlowCompiler {
            delay: Duration::ZERO,
        });
        let artifact = build(&compiler, 7, sources(), Duration::from_secs(5)).unwrap();
        assert_eq!(artifact.id, 7);

        let err = build(&compiler, 8, BTreeMap::new(), Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, BuildError::Failed(_)));
    }

    #[test]
    fn test_build_overrunning_deadline_is_interrupted() {
        let compiler: Arc<dyn Compiler> = Arc::new(SlowCompiler {
            delay: Duration::from_millis(500),
        });
        let started = std::time::Instant::now();
        let err = build(&compiler, 1, sources(), Duration::from_millis(20)).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Interrupted(SandboxError::Timeout(_))
        ));
        assert!(started.elapsed() < Duration::from_millis(400));
    }
}
