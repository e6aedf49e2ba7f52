//! Executor: runs the simulator for one scenario and turns its raw output
//! into a stored [`ExecutionResult`].
//!
//! Scenario-level problems (non-zero exit, timeout, unusable output) come
//! back as a failed result. Only a simulator that cannot be started at all
//! is reported as an error, since every other scenario would hit it too.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::Value;
use tokio::process::{Child, Command};
use tracing::{debug, instrument, warn};

use simbatch_shared::{
    ExecutionResult, HARNESS_FILES, ResultPayload, SIMULATION_LOG_FILE, ScenarioDefinition,
    ScenarioFailure, SimbatchError, SimbatchResult,
};

use crate::config::RawOutputPolicy;
use crate::registry::RunRegistry;
use crate::simulator::SimulatorBinary;

const SPAWN_ATTEMPTS: u32 = 3;
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(50);
const LOG_TAIL_LINES: usize = 5;

/// Per-run knobs shared by every scenario of a batch
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Wall-clock limit for one simulator process
    pub timeout: Option<Duration>,
    pub raw_output_policy: RawOutputPolicy,
    /// Which files in the scenario directory count as simulator output
    pub raw_output_pattern: Regex,
}

impl ExecutorOptions {
    pub fn new(raw_output_pattern: Regex) -> Self {
        Self {
            timeout: None,
            raw_output_policy: RawOutputPolicy::default(),
            raw_output_pattern,
        }
    }
}

/// Runs one scenario at a time; cheap to share between workers
pub struct Executor {
    simulator: SimulatorBinary,
    registry: Arc<dyn RunRegistry>,
    options: ExecutorOptions,
}

impl Executor {
    pub fn new(
        simulator: SimulatorBinary,
        registry: Arc<dyn RunRegistry>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            simulator,
            registry,
            options,
        }
    }

    pub fn simulator(&self) -> &SimulatorBinary {
        &self.simulator
    }

    pub fn registry(&self) -> &dyn RunRegistry {
        self.registry.as_ref()
    }

    /// Run the simulator on `scenario` and persist the outcome.
    ///
    /// A scenario that is already complete is not run again; its stored
    /// result is returned instead.
    #[instrument(skip(self, scenario), fields(scenario = %scenario.id))]
    pub async fn execute(&self, scenario: &ScenarioDefinition) -> SimbatchResult<ExecutionResult> {
        if let Some(existing) = self.registry.load(&scenario.output_dir) {
            debug!("Already complete, returning stored result");
            return Ok(existing);
        }

        self.clear_stale_output(&scenario.output_dir);

        let started = Instant::now();
        let outcome = match self.run_simulator(scenario).await? {
            Ok(()) => self.extract(&scenario.output_dir),
            Err(failure) => Err(failure),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(payload) => {
                let result = ExecutionResult::succeeded(
                    scenario.id.clone(),
                    scenario.output_dir.clone(),
                    payload,
                    elapsed_ms,
                );
                match self.registry.store_result(&scenario.output_dir, &result) {
                    Ok(()) => {
                        self.apply_raw_output_policy(&result);
                        result
                    }
                    Err(e) => ExecutionResult::failed(
                        scenario.id.clone(),
                        scenario.output_dir.clone(),
                        ScenarioFailure::extraction(format!(
                            "cannot write result artifact: {}",
                            e
                        )),
                        elapsed_ms,
                    ),
                }
            }
            Err(failure) => ExecutionResult::failed(
                scenario.id.clone(),
                scenario.output_dir.clone(),
                failure,
                elapsed_ms,
            ),
        };

        if let Some(failure) = result.failure() {
            debug!("Scenario failed: {}", failure);
            if let Err(e) = self.registry.store_failure(&scenario.output_dir, &result) {
                warn!("Could not record failure for {}: {}", scenario.id, e);
            }
        } else {
            debug!("Scenario succeeded in {} ms", elapsed_ms);
        }

        Ok(result)
    }

    /// Outer error: the simulator cannot be started. Inner error: it ran and failed.
    async fn run_simulator(
        &self,
        scenario: &ScenarioDefinition,
    ) -> SimbatchResult<Result<(), ScenarioFailure>> {
        let log_path = scenario.output_dir.join(SIMULATION_LOG_FILE);
        let mut child = match self.spawn(scenario, &log_path).await? {
            Ok(child) => child,
            Err(failure) => return Ok(Err(failure)),
        };

        let status = match self.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill timed out simulator: {}", e);
                    }
                    return Ok(Err(ScenarioFailure::SimulatorRuntime {
                        exit_code: None,
                        timed_out: true,
                        message: format!("simulator exceeded timeout of {:?}", limit),
                    }));
                }
            },
            None => child.wait().await,
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                return Ok(Err(runtime_failure(
                    None,
                    format!("failed waiting for simulator: {}", e),
                )));
            }
        };

        if status.success() {
            Ok(Ok(()))
        } else {
            Ok(Err(runtime_failure(
                status.code(),
                describe_exit(status, &log_path),
            )))
        }
    }

    async fn spawn(
        &self,
        scenario: &ScenarioDefinition,
        log_path: &Path,
    ) -> SimbatchResult<Result<Child, ScenarioFailure>> {
        // The child runs inside the scenario directory
        let program = std::path::absolute(self.simulator.path())
            .map_err(|e| SimbatchError::invocation(self.simulator.path(), e.to_string()))?;
        let parameter_file = match std::path::absolute(scenario.parameter_file()) {
            Ok(path) => path,
            Err(e) => {
                return Ok(Err(runtime_failure(
                    None,
                    format!("cannot resolve parameter file: {}", e),
                )));
            }
        };

        let mut attempt = 1;
        loop {
            let (stdout, stderr) = match open_log(log_path) {
                Ok(handles) => handles,
                Err(e) => {
                    return Ok(Err(runtime_failure(
                        None,
                        format!("cannot create {:?}: {}", log_path, e),
                    )));
                }
            };

            let spawned = Command::new(&program)
                .arg(&parameter_file)
                .current_dir(&scenario.output_dir)
                .stdin(Stdio::null())
                .stdout(stdout)
                .stderr(stderr)
                .kill_on_drop(true)
                .spawn();

            match spawned {
                Ok(child) => return Ok(Ok(child)),
                Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                    return Err(SimbatchError::invocation(self.simulator.path(), e.to_string()));
                }
                // A freshly copied binary can still be open for writing elsewhere
                Err(e) if e.kind() == ErrorKind::ExecutableFileBusy && attempt < SPAWN_ATTEMPTS => {
                    debug!("Simulator busy (attempt {}), retrying", attempt);
                    attempt += 1;
                    tokio::time::sleep(SPAWN_RETRY_DELAY).await;
                }
                Err(e) => {
                    return Ok(Err(runtime_failure(
                        None,
                        format!("failed to start simulator: {}", e),
                    )));
                }
            }
        }
    }

    /// Whether `name` is simulator output this executor extracts
    fn is_raw_output(&self, name: &str) -> bool {
        !HARNESS_FILES.contains(&name) && self.options.raw_output_pattern.is_match(name)
    }

    /// Remove raw output left by an earlier attempt so it cannot be
    /// extracted as this run's result.
    fn clear_stale_output(&self, dir: &Path) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !path.is_file() || !self.is_raw_output(name) {
                continue;
            }
            debug!("Removing stale output {:?}", path);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Could not remove stale output {:?}: {}", path, e);
            }
        }
    }

    /// Collect matching raw output files from a scenario directory.
    fn extract(&self, dir: &Path) -> Result<ResultPayload, ScenarioFailure> {
        let entries = fs::read_dir(dir).map_err(|e| {
            ScenarioFailure::extraction(format!("cannot read output directory: {}", e))
        })?;

        let mut files = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                ScenarioFailure::extraction(format!("cannot read output directory: {}", e))
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !self.is_raw_output(name) {
                continue;
            }

            files.insert(name.to_string(), read_output_file(&path, name)?);
        }

        if files.is_empty() {
            return Err(ScenarioFailure::extraction(format!(
                "no output files matching '{}'",
                self.options.raw_output_pattern
            )));
        }

        Ok(ResultPayload { files })
    }

    fn apply_raw_output_policy(&self, result: &ExecutionResult) {
        if self.options.raw_output_policy != RawOutputPolicy::DiscardOnSuccess {
            return;
        }
        let Some(payload) = &result.payload else {
            return;
        };

        for name in payload.files.keys() {
            let path = result.raw_output_dir.join(name);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Could not discard raw output {:?}: {}", path, e);
            }
        }
    }
}

fn open_log(path: &Path) -> std::io::Result<(Stdio, Stdio)> {
    let stdout = File::create(path)?;
    let stderr = stdout.try_clone()?;
    Ok((Stdio::from(stdout), Stdio::from(stderr)))
}

fn read_output_file(path: &Path, name: &str) -> Result<Value, ScenarioFailure> {
    let content = fs::read(path)
        .map_err(|e| ScenarioFailure::extraction(format!("cannot read {}: {}", name, e)))?;

    if name.ends_with(".json") {
        serde_json::from_slice(&content)
            .map_err(|e| ScenarioFailure::extraction(format!("malformed JSON in {}: {}", name, e)))
    } else {
        String::from_utf8(content)
            .map(Value::String)
            .map_err(|_| ScenarioFailure::extraction(format!("{} is not valid UTF-8", name)))
    }
}

fn runtime_failure(exit_code: Option<i32>, message: String) -> ScenarioFailure {
    ScenarioFailure::SimulatorRuntime {
        exit_code,
        timed_out: false,
        message,
    }
}

fn describe_exit(status: ExitStatus, log_path: &Path) -> String {
    let tail = fs::read_to_string(log_path)
        .map(|log| {
            let lines: Vec<&str> = log.lines().collect();
            lines[lines.len().saturating_sub(LOG_TAIL_LINES)..].join("\n")
        })
        .unwrap_or_default();

    if tail.is_empty() {
        format!("simulator {}", status)
    } else {
        format!("simulator {}; last output:\n{}", status, tail)
    }
}
