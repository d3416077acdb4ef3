//! Per-test coverage report format consumed by fault localization.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Location;

/// Coverage and outcome of one test on the unmodified program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCoverage {
    /// Test identifier.
    pub test: String,
    /// Whether the test passed before repair.
    pub passed: bool,
    /// Locations executed by the test.
    #[serde(default)]
    pub covered: Vec<Location>,
}

/// Coverage for a whole test suite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageReport {
    pub tests: Vec<TestCoverage>,
}

impl CoverageReport {
    /// Load a report from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn failing(&self) -> impl Iterator<Item = &TestCoverage> {
        self.tests.iter().filter(|t| !t.passed)
    }

    pub fn passing(&self) -> impl Iterator<Item = &TestCoverage> {
        self.tests.iter().filter(|t| t.passed)
    }
}
