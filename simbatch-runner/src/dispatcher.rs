//! Dispatcher - bounded parallel execution of a scenario set.
//!
//! Completed scenarios are filtered out first, the remainder is fanned out
//! over at most `max_workers` concurrent executors. Scenario failures are
//! collected as data. An invocation error stops the pass: nothing new is
//! started, running scenarios are awaited, then the error is returned.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{error, info, instrument, warn};

use simbatch_shared::{
    ExecutionResult, FailureKind, ScenarioDefinition, ScenarioFailure, ScenarioId, SimbatchError,
    SimbatchResult,
};

use crate::executor::Executor;
use crate::registry::RunRegistry;

/// Counts reported at the end of a pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub already_completed: usize,
    pub succeeded: usize,
    pub failed_runtime: usize,
    pub failed_extraction: usize,
}

impl DispatchSummary {
    pub fn failed(&self) -> usize {
        self.failed_runtime + self.failed_extraction
    }

    pub fn total(&self) -> usize {
        self.already_completed + self.succeeded + self.failed()
    }
}

impl fmt::Display for DispatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} already completed, {} succeeded, {} failed (runtime: {}, extraction: {})",
            self.already_completed,
            self.succeeded,
            self.failed(),
            self.failed_runtime,
            self.failed_extraction
        )
    }
}

/// Outcome of one dispatch pass
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Results of scenarios executed in this pass
    pub results: BTreeMap<ScenarioId, ExecutionResult>,
    /// Scenarios skipped because they were already complete
    pub already_completed: Vec<ScenarioId>,
}

impl DispatchReport {
    pub fn summary(&self) -> DispatchSummary {
        let mut summary = DispatchSummary {
            already_completed: self.already_completed.len(),
            ..DispatchSummary::default()
        };
        for result in self.results.values() {
            match result.failure_kind() {
                None => summary.succeeded += 1,
                Some(FailureKind::Runtime) => summary.failed_runtime += 1,
                Some(FailureKind::Extraction) => summary.failed_extraction += 1,
            }
        }
        summary
    }

    /// Results that ended in a scenario failure
    pub fn failures(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.values().filter(|r| !r.is_success())
    }
}

/// Fans scenarios out over a bounded pool of executors
pub struct Dispatcher {
    executor: Arc<Executor>,
}

impl Dispatcher {
    pub fn new(executor: Executor) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    /// Execute every incomplete scenario with at most `max_workers` in flight.
    #[instrument(skip(self, scenarios), fields(scenarios = scenarios.len()))]
    pub async fn run(
        &self,
        scenarios: Vec<ScenarioDefinition>,
        max_workers: usize,
    ) -> SimbatchResult<DispatchReport> {
        if max_workers == 0 {
            return Err(SimbatchError::configuration(
                "Worker count must be greater than 0",
            ));
        }
        self.executor.simulator().check()?;

        let registry = self.executor.registry();
        let mut report = DispatchReport::default();
        let mut seen = BTreeSet::new();
        let mut pending = Vec::new();
        for scenario in scenarios {
            if !seen.insert(scenario.id.clone()) {
                warn!("Duplicate scenario {} ignored", scenario.id);
                continue;
            }
            if registry.is_complete(&scenario.output_dir) {
                report.already_completed.push(scenario.id);
            } else {
                pending.push(scenario);
            }
        }

        info!(
            "Dispatching {} scenarios on {} workers ({} already completed)",
            pending.len(),
            max_workers,
            report.already_completed.len()
        );

        let semaphore = Arc::new(Semaphore::new(max_workers));
        let abort = Arc::new(AtomicBool::new(false));
        let mut join_set = JoinSet::new();
        let mut in_flight: HashMap<task::Id, (ScenarioId, PathBuf)> = HashMap::new();

        for scenario in pending {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SimbatchError::configuration(format!("worker pool closed: {}", e)))?;
            if abort.load(Ordering::SeqCst) {
                break;
            }

            let executor = Arc::clone(&self.executor);
            let abort = Arc::clone(&abort);
            let key = (scenario.id.clone(), scenario.output_dir.clone());
            let handle = join_set.spawn(async move {
                let result = executor.execute(&scenario).await;
                if result.is_err() {
                    abort.store(true, Ordering::SeqCst);
                }
                drop(permit);
                (scenario, result)
            });
            in_flight.insert(handle.id(), key);
        }

        let mut fatal = None;
        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((_, (scenario, Ok(result)))) => {
                    if let Some(failure) = result.failure() {
                        warn!(
                            "Scenario {} failed in {:?}: {}",
                            scenario.id, scenario.output_dir, failure
                        );
                    }
                    report.results.insert(scenario.id, result);
                }
                Ok((_, (scenario, Err(e)))) => {
                    error!("Scenario {} aborted the batch: {}", scenario.id, e);
                    fatal.get_or_insert(e);
                }
                Err(e) => match in_flight.remove(&e.id()) {
                    Some((id, dir)) => {
                        error!("Worker for scenario {} failed: {}", id, e);
                        let result = self.worker_failure(id.clone(), dir, &e);
                        report.results.insert(id, result);
                    }
                    None => error!("Worker task failed: {}", e),
                },
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        info!("Dispatch finished: {}", report.summary());
        Ok(report)
    }

    /// Record a worker that died without producing a result as a runtime failure.
    fn worker_failure(
        &self,
        id: ScenarioId,
        dir: PathBuf,
        error: &task::JoinError,
    ) -> ExecutionResult {
        let failure = ScenarioFailure::SimulatorRuntime {
            exit_code: None,
            timed_out: false,
            message: format!("worker failed: {}", error),
        };
        let result = ExecutionResult::failed(id, dir.clone(), failure, 0);
        if let Err(e) = self.executor.registry().store_failure(&dir, &result) {
            warn!("Could not record failure in {:?}: {}", dir, e);
        }
        result
    }
}

/// Keep only scenarios whose last recorded failure is of the given kind.
pub fn select_failed(
    scenarios: Vec<ScenarioDefinition>,
    registry: &dyn RunRegistry,
    kind: FailureKind,
) -> Vec<ScenarioDefinition> {
    let selected: Vec<_> = scenarios
        .into_iter()
        .filter(|s| last_failure_kind(registry, &s.output_dir) == Some(kind))
        .collect();
    info!(
        "Selected {} scenarios with {:?} failures for retry",
        selected.len(),
        kind
    );
    selected
}

fn last_failure_kind(registry: &dyn RunRegistry, dir: &Path) -> Option<FailureKind> {
    if registry.is_complete(dir) {
        return None;
    }
    registry.last_failure(dir).map(|f| f.kind())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::executor::ExecutorOptions;
    use crate::registry::FsRunRegistry;
    use crate::scenario::ScenarioGenerator;
    use crate::simulator::SimulatorBinary;
    use regex::Regex;
    use simbatch_shared::{DimensionCandidates, SIMULATION_LOG_FILE};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_simulator(dir: &Path, body: &str) -> SimulatorBinary {
        let path = dir.join("fake_sim.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        SimulatorBinary::new(path)
    }

    fn dispatcher(simulator: SimulatorBinary) -> Dispatcher {
        let options = ExecutorOptions::new(Regex::new(r"\.json$").unwrap());
        Dispatcher::new(Executor::new(
            simulator,
            Arc::new(FsRunRegistry::new()),
            options,
        ))
    }

    fn scenarios(root: &Path, count: u32) -> Vec<ScenarioDefinition> {
        let candidates = DimensionCandidates {
            attackers: (0..count).collect(),
            ..DimensionCandidates::default()
        };
        ScenarioGenerator::new(root, Arc::new(FsRunRegistry::new()))
            .generate(0, 1, &candidates)
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_scenarios_succeed() {
        let tools = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let sim = fake_simulator(tools.path(), "cat \"$1\" > out.json");

        let report = dispatcher(sim)
            .run(scenarios(root.path(), 6), 3)
            .await
            .unwrap();

        let summary = report.summary();
        assert_eq!(summary.succeeded, 6);
        assert_eq!(summary.total(), 6);
        assert_eq!(report.failures().count(), 0);
    }

    #[tokio::test]
    async fn test_worker_bound_is_respected() {
        let tools = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let running = tools.path().join("running");
        let samples = tools.path().join("samples");
        fs::create_dir(&running).unwrap();
        let sim = fake_simulator(
            tools.path(),
            &format!(
                "touch {running}/$$\nls {running} | wc -l >> {samples}\nsleep 0.2\nrm {running}/$$\necho '{{}}' > out.json",
                running = running.display(),
                samples = samples.display()
            ),
        );

        let report = dispatcher(sim)
            .run(scenarios(root.path(), 6), 2)
            .await
            .unwrap();
        assert_eq!(report.summary().succeeded, 6);

        let observed: Vec<usize> = fs::read_to_string(&samples)
            .unwrap()
            .lines()
            .map(|l| l.trim().parse().unwrap())
            .collect();
        assert_eq!(observed.len(), 6);
        assert!(observed.iter().all(|&n| n <= 2), "observed {:?}", observed);
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let tools = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let sim = fake_simulator(tools.path(), "exit 0");

        let err = dispatcher(sim)
            .run(scenarios(root.path(), 1), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, SimbatchError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_unusable_binary_fails_before_any_work() {
        let root = TempDir::new().unwrap();
        let set = scenarios(root.path(), 3);
        let sim = SimulatorBinary::new(root.path().join("missing-sim"));

        let err = dispatcher(sim).run(set.clone(), 2).await.unwrap_err();

        assert!(err.is_invocation());
        for scenario in &set {
            assert!(!scenario.output_dir.join(SIMULATION_LOG_FILE).exists());
        }
    }

    #[tokio::test]
    async fn test_binary_vanishing_mid_run_stops_new_work() {
        let tools = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let set = scenarios(root.path(), 4);
        let sim = fake_simulator(tools.path(), "rm \"$0\"\nexit 0");

        let err = dispatcher(sim).run(set.clone(), 1).await.unwrap_err();

        assert!(err.is_invocation());
        let started = set
            .iter()
            .filter(|s| s.output_dir.join(SIMULATION_LOG_FILE).exists())
            .count();
        assert!(started < set.len());
        assert!(set.iter().all(|s| !FsRunRegistry::new().is_complete(&s.output_dir)));
    }

    #[tokio::test]
    async fn test_duplicates_run_once() {
        let tools = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let counter = tools.path().join("count");
        let sim = fake_simulator(
            tools.path(),
            &format!("echo x >> {}\necho '{{}}' > out.json", counter.display()),
        );
        let mut set = scenarios(root.path(), 1);
        set.push(set[0].clone());

        let report = dispatcher(sim).run(set, 2).await.unwrap();

        assert_eq!(report.results.len(), 1);
        assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 1);
    }

    /// Registry whose artifact writes blow up for one scenario
    struct PanicOnStore {
        inner: FsRunRegistry,
        marker: &'static str,
    }

    impl RunRegistry for PanicOnStore {
        fn is_complete(&self, dir: &Path) -> bool {
            self.inner.is_complete(dir)
        }

        fn load(&self, dir: &Path) -> Option<ExecutionResult> {
            self.inner.load(dir)
        }

        fn store_result(&self, dir: &Path, result: &ExecutionResult) -> SimbatchResult<()> {
            if dir.to_string_lossy().contains(self.marker) {
                panic!("artifact store exploded");
            }
            self.inner.store_result(dir, result)
        }

        fn store_failure(&self, dir: &Path, result: &ExecutionResult) -> SimbatchResult<()> {
            self.inner.store_failure(dir, result)
        }

        fn last_failure(&self, dir: &Path) -> Option<ScenarioFailure> {
            self.inner.last_failure(dir)
        }
    }

    #[tokio::test]
    async fn test_panicked_worker_is_counted_as_failure() {
        let tools = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let set = scenarios(root.path(), 3);
        let sim = fake_simulator(tools.path(), "echo '{}' > out.json");
        let registry = PanicOnStore {
            inner: FsRunRegistry::new(),
            marker: "_atk1_",
        };
        let dispatcher = Dispatcher::new(Executor::new(
            sim,
            Arc::new(registry),
            ExecutorOptions::new(Regex::new(r"\.json$").unwrap()),
        ));

        let report = dispatcher.run(set.clone(), 2).await.unwrap();

        let summary = report.summary();
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed_runtime, 1);
        let failed: Vec<_> = report.failures().collect();
        assert!(failed[0].scenario_id.contains("_atk1_"));

        let retry = select_failed(set, &FsRunRegistry::new(), FailureKind::Runtime);
        assert_eq!(retry.len(), 1);
    }

    #[tokio::test]
    async fn test_select_failed_by_kind() {
        let tools = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let set = scenarios(root.path(), 3);

        // attacker 0 fails at runtime, 1 produces nothing, 2 succeeds
        let sim = fake_simulator(
            tools.path(),
            "case \"$PWD\" in\n*_atk0_*) exit 4 ;;\n*_atk1_*) exit 0 ;;\nesac\necho '{}' > out.json",
        );
        let report = dispatcher(sim).run(set.clone(), 3).await.unwrap();
        let summary = report.summary();
        assert_eq!(summary.failed_runtime, 1);
        assert_eq!(summary.failed_extraction, 1);
        assert_eq!(summary.succeeded, 1);

        let registry = FsRunRegistry::new();
        let runtime = select_failed(set.clone(), &registry, FailureKind::Runtime);
        assert_eq!(runtime.len(), 1);
        assert!(runtime[0].id.contains("_atk0_"));

        let extraction = select_failed(set, &registry, FailureKind::Extraction);
        assert_eq!(extraction.len(), 1);
        assert!(extraction[0].id.contains("_atk1_"));
    }
}
