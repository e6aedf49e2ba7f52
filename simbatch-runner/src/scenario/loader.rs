//! Scenario Loader - discovery of existing scenario directories.
//!
//! Walks an output root and picks up every directory holding a parameter
//! file, whether it was written by the generator or prepared by hand.
//! Unreadable or malformed files are logged and skipped so one bad
//! directory does not hide the rest.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use simbatch_shared::{
    PARAMETERS_FILE, ScenarioDefinition, ScenarioId, ScenarioSpec, SimbatchError, SimbatchResult,
};

/// Finds scenario directories under an output root.
#[derive(Debug, Clone)]
pub struct ScenarioLoader {
    root: PathBuf,
}

impl ScenarioLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load every scenario below the root, sorted by id.
    pub fn discover(&self) -> SimbatchResult<Vec<ScenarioDefinition>> {
        if !self.root.is_dir() {
            return Err(SimbatchError::configuration(format!(
                "Output root {:?} does not exist or is not a directory",
                self.root
            )));
        }

        let mut scenarios = Vec::new();
        self.scan_directory(&self.root, &mut scenarios);
        scenarios.sort_by(|a, b| a.id.cmp(&b.id));

        info!(
            "Discovered {} scenarios under {:?}",
            scenarios.len(),
            self.root
        );
        Ok(scenarios)
    }

    fn scan_directory(&self, dir: &Path, scenarios: &mut Vec<ScenarioDefinition>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read directory {:?}: {}", dir, e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            // file_type() does not follow links, so symlinked directories are never entered
            let Ok(file_type) = entry.file_type() else {
                warn!("Cannot determine file type of {:?}", path);
                continue;
            };
            if file_type.is_symlink() && path.is_dir() {
                debug!("Not following symlinked directory {:?}", path);
                continue;
            }
            if file_type.is_dir() {
                self.scan_directory(&path, scenarios);
                continue;
            }

            if path.file_name().and_then(|n| n.to_str()) != Some(PARAMETERS_FILE) {
                continue;
            }

            if dir == self.root {
                warn!(
                    "Ignoring parameter file directly under the output root: {:?}",
                    path
                );
                continue;
            }

            match self.load_scenario(dir) {
                Ok(scenario) => scenarios.push(scenario),
                Err(e) => warn!("Skipping scenario in {:?}: {:#}", dir, e),
            }
        }
    }

    /// Load the scenario whose parameter file lives in `dir`.
    fn load_scenario(&self, dir: &Path) -> Result<ScenarioDefinition> {
        let path = dir.join(PARAMETERS_FILE);
        debug!("Loading scenario from {:?}", path);

        let content =
            fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        let parameters: Map<String, Value> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse parameter file {:?}", path))?;

        let spec = serde_json::from_value::<ScenarioSpec>(Value::Object(parameters.clone())).ok();

        Ok(ScenarioDefinition {
            id: self.scenario_id(dir)?,
            parameters,
            output_dir: dir.to_path_buf(),
            spec,
        })
    }

    fn scenario_id(&self, dir: &Path) -> Result<ScenarioId> {
        let relative = dir
            .strip_prefix(&self.root)
            .with_context(|| format!("{:?} is outside {:?}", dir, self.root))?;

        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(segments.join("/"))
    }
}
