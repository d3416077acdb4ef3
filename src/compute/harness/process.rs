//! Compiler and test harness backed by external commands.
//!
//! Command arguments may contain placeholders: `{src}`, `{out}` and `{id}` for
//! the compiler, `{artifact}` and `{id}` for the test harness.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::debug;

use super::{Artifact, CompileFailure, Compiler, HarnessError, TestHarness};

/// Above this many tests the ids are passed through an `@file` argument list.
///
/// The count covers the whole request, negative tests included.
pub const MAX_INLINE_TESTS: usize = 300;

const FAILED_TEST_PREFIX: &str = "FailedTest:";
const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct CommandOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

fn spawn_reader<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<String>> {
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = stream.read_to_string(&mut buf);
            buf
        })
    })
}

fn join_reader(reader: Option<JoinHandle<String>>) -> String {
    reader.and_then(|r| r.join().ok()).unwrap_or_default()
}

/// Run a command, killing it once `timeout` elapses.
fn run_command(
    program: &str,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<CommandOutput, HarnessError> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| HarnessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(HarnessError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(CommandOutput {
        status,
        stdout: join_reader(stdout),
        stderr: join_reader(stderr),
    })
}

fn substitute(args: &[String], values: &[(&str, &str)]) -> Vec<String> {
    args.iter()
        .map(|arg| {
            values
                .iter()
                .fold(arg.clone(), |acc, (key, value)| acc.replace(key, value))
        })
        .collect()
}

/// Writes edited files into `<work_dir>/bin_<id>/src` and runs a build command.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
    timeout: Duration,
}

impl CommandCompiler {
    pub fn new(program: impl Into<String>, args: Vec<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: work_dir.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn prepare(&self, id: u64, sources: &BTreeMap<String, String>) -> std::io::Result<PathBuf> {
        let dir = self.work_dir.join(format!("bin_{id}"));
        let src = dir.join("src");
        for (file, content) in sources {
            let path = src.join(file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, content)?;
        }
        fs::create_dir_all(&src)?;
        fs::create_dir_all(dir.join("out"))?;
        Ok(dir)
    }
}

impl Compiler for CommandCompiler {
    fn compile(
        &self,
        id: u64,
        sources: &BTreeMap<String, String>,
    ) -> Result<Artifact, CompileFailure> {
        let dir = self
            .prepare(id, sources)
            .map_err(|e| CompileFailure::new(vec![format!("failed to prepare sources: {e}")]))?;
        let src = dir.join("src");
        let out = dir.join("out");
        let src_text = src.to_string_lossy().into_owned();
        let out_text = out.to_string_lossy().into_owned();
        let id_text = id.to_string();
        let args = substitute(
            &self.args,
            &[
                ("{src}", src_text.as_str()),
                ("{out}", out_text.as_str()),
                ("{id}", id_text.as_str()),
            ],
        );

        let output = run_command(&self.program, &args, &dir, self.timeout)
            .map_err(|e| CompileFailure::new(vec![e.to_string()]))?;
        if !output.status.success() {
            let mut diagnostics: Vec<String> = output
                .stderr
                .lines()
                .chain(output.stdout.lines())
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            if diagnostics.is_empty() {
                diagnostics.push(format!("build command exited with {}", output.status));
            }
            return Err(CompileFailure::new(diagnostics));
        }

        debug!("Evaluation {id}: compiled into {}", out.display());
        Ok(Artifact { id, path: out })
    }
}

/// Runs a test command and parses `FailedTest: <id>` lines from its stdout.
#[derive(Debug, Clone)]
pub struct CommandTestHarness {
    program: String,
    args: Vec<String>,
}

impl CommandTestHarness {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn arguments(&self, artifact: &Artifact, tests: &[String]) -> std::io::Result<Vec<String>> {
        let path_text = artifact.path.to_string_lossy().into_owned();
        let id_text = artifact.id.to_string();
        let mut args = substitute(
            &self.args,
            &[("{artifact}", path_text.as_str()), ("{id}", id_text.as_str())],
        );
        if tests.len() > MAX_INLINE_TESTS {
            fs::create_dir_all(&artifact.path)?;
            let list = artifact.path.join("tests.txt");
            fs::write(&list, tests.join("\n"))?;
            args.push(format!("@{}", list.display()));
        } else {
            args.extend(tests.iter().cloned());
        }
        Ok(args)
    }
}

fn parse_failed_tests(stdout: &str) -> Result<BTreeSet<String>, HarnessError> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix(FAILED_TEST_PREFIX))
        .map(|id| {
            let id = id.trim();
            if id.is_empty() {
                Err(HarnessError::MalformedOutput(format!(
                    "{FAILED_TEST_PREFIX} line without a test id"
                )))
            } else {
                Ok(id.to_string())
            }
        })
        .collect()
}

impl TestHarness for CommandTestHarness {
    fn run_tests(
        &self,
        artifact: &Artifact,
        tests: &[String],
        timeout: Duration,
    ) -> Result<BTreeSet<String>, HarnessError> {
        if tests.is_empty() {
            return Err(HarnessError::NoTests);
        }
        let args = self.arguments(artifact, tests)?;
        let cwd = if artifact.path.is_dir() {
            artifact.path.as_path()
        } else {
            Path::new(".")
        };

        let output = run_command(&self.program, &args, cwd, timeout)?;
        if !output.status.success() {
            return Err(HarnessError::ExitStatus {
                code: output.status.code(),
            });
        }
        let failed = parse_failed_tests(&output.stdout)?;
        debug!(
            "Evaluation {}: {} of {} tests failed",
            artifact.id,
            failed.len(),
            tests.len()
        );
        Ok(failed)
    }
}
