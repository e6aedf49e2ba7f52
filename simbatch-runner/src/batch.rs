//! One invocation of the batch harness, driven by a [`ConfigManager`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use simbatch_shared::ScenarioDefinition;

use crate::aggregate;
use crate::config::{ConfigManager, RunMode};
use crate::dispatcher::{DispatchReport, Dispatcher, select_failed};
use crate::executor::Executor;
use crate::registry::{FsRunRegistry, RunRegistry};
use crate::scenario::{ScenarioGenerator, ScenarioLoader};

/// What a finished invocation produced
#[derive(Debug)]
pub enum BatchOutcome {
    Dispatched(DispatchReport),
    Collected(PathBuf),
}

/// Run the configured mode to completion.
#[instrument(skip(config), fields(mode = ?config.app.mode))]
pub async fn run(config: &ConfigManager) -> Result<BatchOutcome> {
    let registry: Arc<dyn RunRegistry> = Arc::new(FsRunRegistry::new());
    let root = &config.run.output_root;

    let scenarios = match config.app.mode {
        RunMode::Collect => {
            let path = aggregate::collect_to_file(root, registry.as_ref())
                .with_context(|| format!("Failed to collect results under {:?}", root))?;
            return Ok(BatchOutcome::Collected(path));
        }
        RunMode::GenerateAndRun => ScenarioGenerator::new(root, Arc::clone(&registry))
            .with_base_parameters(config.sweep.base_parameters.clone())
            .generate_sweep(&config.sweep)
            .context("Scenario generation failed")?,
        RunMode::RunExisting => {
            let discovered = ScenarioLoader::new(root).discover()?;
            match config.run.retry_failed {
                Some(kind) => select_failed(discovered, registry.as_ref(), kind),
                None => discovered,
            }
        }
    };

    dispatch(config, registry, scenarios)
        .await
        .map(BatchOutcome::Dispatched)
}

async fn dispatch(
    config: &ConfigManager,
    registry: Arc<dyn RunRegistry>,
    scenarios: Vec<ScenarioDefinition>,
) -> Result<DispatchReport> {
    let mut simulator = config.run.simulator_binary()?;
    if config.run.stage_binary {
        simulator = simulator.stage_into(&config.run.output_root)?;
    }
    info!("Using simulator {:?}", simulator.path());

    let executor = Executor::new(simulator, registry, config.run.executor_options());
    let report = Dispatcher::new(executor)
        .run(scenarios, config.run.max_workers)
        .await?;
    Ok(report)
}
