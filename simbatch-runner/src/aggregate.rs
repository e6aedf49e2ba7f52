//! Aggregator: gathers stored results under an output root into one file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use simbatch_shared::{ExecutionResult, ScenarioId, SimbatchResult};

use crate::registry::RunRegistry;
use crate::scenario::ScenarioLoader;

/// Name of the aggregate written at the output root
pub const AGGREGATE_FILE: &str = "aggregate.json";

/// Every completed result under one output root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub collected_at: DateTime<Utc>,
    pub results: BTreeMap<ScenarioId, ExecutionResult>,
    /// Scenarios found on disk without a completed result
    pub incomplete: Vec<ScenarioId>,
}

impl Aggregate {
    pub fn completed(&self) -> usize {
        self.results.len()
    }
}

/// Scan `root` and load every completed result.
#[instrument(skip(root, registry), fields(root = %root.display()))]
pub fn collect(root: &Path, registry: &dyn RunRegistry) -> SimbatchResult<Aggregate> {
    let mut results = BTreeMap::new();
    let mut incomplete = Vec::new();

    for scenario in ScenarioLoader::new(root).discover()? {
        match registry.load(&scenario.output_dir) {
            Some(result) => {
                results.insert(scenario.id, result);
            }
            None => incomplete.push(scenario.id),
        }
    }

    info!(
        "Collected {} completed results ({} incomplete)",
        results.len(),
        incomplete.len()
    );
    Ok(Aggregate {
        collected_at: Utc::now(),
        results,
        incomplete,
    })
}

/// Collect and write the aggregate to `<root>/aggregate.json`.
pub fn collect_to_file(root: &Path, registry: &dyn RunRegistry) -> SimbatchResult<PathBuf> {
    let aggregate = collect(root, registry)?;
    let path = root.join(AGGREGATE_FILE);
    fs::write(&path, serde_json::to_vec_pretty(&aggregate)?)?;
    info!("Wrote aggregate to {:?}", path);
    Ok(path)
}
