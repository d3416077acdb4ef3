//! Run manifest consumed by the command-line driver.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::RepairConfig;

/// An external command with `{placeholder}` arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Overrides `evaluation.compile_timeout_ms` (compile commands only).
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Everything needed to run one repair from the command line.
///
/// Relative paths are resolved against the manifest's directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(default)]
    pub config: RepairConfig,
    /// Coverage report of the unmodified program.
    pub coverage: PathBuf,
    /// Modification point catalog.
    pub catalog: PathBuf,
    /// Root the catalog's file paths are relative to.
    pub source_root: PathBuf,
    /// Scratch directory for per-evaluation builds.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Build command; `{src}`, `{out}` and `{id}` are substituted.
    pub compile: CommandSpec,
    /// Test command; `{artifact}` and `{id}` are substituted, test ids appended.
    pub test: CommandSpec,
    /// Where to write the search result as JSON.
    #[serde(default)]
    pub result: Option<PathBuf>,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("evorepair-work")
}

impl RunManifest {
    /// Load a manifest and resolve its relative paths.
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(manifest.resolved(base))
    }

    fn resolved(mut self, base: &Path) -> Self {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.coverage);
        resolve(&mut self.catalog);
        resolve(&mut self.source_root);
        resolve(&mut self.work_dir);
        if let Some(result) = &mut self.result {
            resolve(result);
        }
        if let Some(dir) = &mut self.config.output.patch_output_dir {
            resolve(dir);
        }
        self
    }

    /// A manifest for a Maven-style Java project.
    pub fn example() -> Self {
        let mut config = RepairConfig::default();
        config.output.patch_output_dir = Some(PathBuf::from("patches"));
        Self {
            config,
            coverage: PathBuf::from("coverage.json"),
            catalog: PathBuf::from("catalog.json"),
            source_root: PathBuf::from("src/main/java"),
            work_dir: default_work_dir(),
            compile: CommandSpec {
                program: "javac".to_string(),
                args: vec![
                    "-d".to_string(),
                    "{out}".to_string(),
                    "-sourcepath".to_string(),
                    "{src}".to_string(),
                ],
                timeout_ms: Some(120_000),
            },
            test: CommandSpec {
                program: "./run-tests.sh".to_string(),
                args: vec!["{artifact}".to_string()],
                timeout_ms: None,
            },
            result: Some(PathBuf::from("result.json")),
        }
    }
}
