//! Scenario Generator - cross-product expansion into parameter files.
//!
//! Every combination of candidate values becomes one scenario directory
//! under the output root, holding a freshly written parameter file. The
//! directory path is derived from the combination alone, so generating the
//! same sweep twice revisits the same directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use simbatch_shared::{
    DimensionCandidates, ScenarioDefinition, ScenarioSpec, SimbatchError, SimbatchResult,
    SweepConfig,
};

use crate::registry::RunRegistry;

const WRITE_PROBE: &str = ".simbatch-write-probe";

/// Expands candidate lists into scenario definitions on disk
pub struct ScenarioGenerator {
    output_root: PathBuf,
    registry: Arc<dyn RunRegistry>,
    base_parameters: Map<String, Value>,
}

impl ScenarioGenerator {
    pub fn new(output_root: impl Into<PathBuf>, registry: Arc<dyn RunRegistry>) -> Self {
        Self {
            output_root: output_root.into(),
            registry,
            base_parameters: Map::new(),
        }
    }

    /// Opaque parameters merged into every generated parameter file
    pub fn with_base_parameters(mut self, base_parameters: Map<String, Value>) -> Self {
        self.base_parameters = base_parameters;
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Full cross-product of the candidate lists for one batch and UE count.
    pub fn expand(
        batch: u32,
        num_ues: u32,
        candidates: &DimensionCandidates,
    ) -> SimbatchResult<Vec<ScenarioSpec>> {
        if let Some(name) = candidates.first_empty() {
            return Err(SimbatchError::configuration(format!(
                "Dimension '{}' has no candidate values",
                name
            )));
        }

        let mut specs = Vec::with_capacity(candidates.combination_count());
        for &ue_speed in &candidates.ue_speeds {
            for &clustered_ues in &candidates.clustered_ues {
                for &dynamic_spectrum_access in &candidates.dynamic_spectrum_access {
                    for &markov in &candidates.markov {
                        for &harmonic in &candidates.harmonic {
                            for &fusion_algorithm in &candidates.fusion_algorithms {
                                for &attacker in &candidates.attackers {
                                    for &frequency_band in &candidates.frequency_bands {
                                        for &mimo_mode in &candidates.mimo_modes {
                                            specs.push(ScenarioSpec {
                                                batch,
                                                num_ues,
                                                ue_speed,
                                                clustered_ues,
                                                dynamic_spectrum_access,
                                                markov,
                                                harmonic,
                                                fusion_algorithm,
                                                attacker,
                                                frequency_band,
                                                mimo_mode,
                                            });
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(specs)
    }

    /// Materialize every scenario of one batch and UE count.
    ///
    /// Parameter files are rewritten unconditionally, except in directories
    /// that already hold a completed result; those are left untouched but
    /// still returned.
    #[instrument(skip(self, candidates), fields(root = %self.output_root.display()))]
    pub fn generate(
        &self,
        batch: u32,
        num_ues: u32,
        candidates: &DimensionCandidates,
    ) -> SimbatchResult<Vec<ScenarioDefinition>> {
        let specs = Self::expand(batch, num_ues, candidates)?;
        self.ensure_writable_root()?;

        let mut definitions = Vec::with_capacity(specs.len());
        for spec in specs {
            let definition =
                ScenarioDefinition::from_spec(&self.output_root, spec, &self.base_parameters);
            self.write_parameters(&definition)?;
            definitions.push(definition);
        }

        debug!(
            "Generated {} scenarios for batch {} with {} UEs",
            definitions.len(),
            batch,
            num_ues
        );
        Ok(definitions)
    }

    /// Materialize a whole sweep: every batch × UE count × candidate combination.
    #[instrument(skip(self, sweep), fields(root = %self.output_root.display()))]
    pub fn generate_sweep(&self, sweep: &SweepConfig) -> SimbatchResult<Vec<ScenarioDefinition>> {
        if sweep.batches.is_empty() {
            return Err(SimbatchError::configuration("No batches to generate"));
        }
        if sweep.ue_counts.is_empty() {
            return Err(SimbatchError::configuration("No UE counts to generate"));
        }
        // Reject bad candidates before the first file is written
        if let Some(name) = sweep.candidates.first_empty() {
            return Err(SimbatchError::configuration(format!(
                "Dimension '{}' has no candidate values",
                name
            )));
        }

        let mut definitions = Vec::with_capacity(sweep.scenario_count());
        for &batch in &sweep.batches {
            for &num_ues in &sweep.ue_counts {
                definitions.extend(self.generate(batch, num_ues, &sweep.candidates)?);
            }
        }

        info!(
            "Prepared {} scenario definitions under {:?}",
            definitions.len(),
            self.output_root
        );
        Ok(definitions)
    }

    fn ensure_writable_root(&self) -> SimbatchResult<()> {
        let not_writable = |e: std::io::Error| {
            SimbatchError::configuration(format!(
                "Output root {:?} is not writable: {}",
                self.output_root, e
            ))
        };

        fs::create_dir_all(&self.output_root).map_err(not_writable)?;
        let probe = self.output_root.join(WRITE_PROBE);
        fs::write(&probe, b"").map_err(not_writable)?;
        fs::remove_file(&probe).map_err(not_writable)?;
        Ok(())
    }

    fn write_parameters(&self, definition: &ScenarioDefinition) -> SimbatchResult<()> {
        if self.registry.is_complete(&definition.output_dir) {
            debug!(
                "Scenario {} already completed, leaving {:?} untouched",
                definition.id, definition.output_dir
            );
            return Ok(());
        }

        fs::create_dir_all(&definition.output_dir)?;
        let content = serde_json::to_string_pretty(&definition.parameters)?;
        fs::write(definition.parameter_file(), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FsRunRegistry;
    use simbatch_shared::{ExecutionResult, PARAMETERS_FILE, ResultPayload};
    use tempfile::TempDir;

    fn generator(root: &Path) -> ScenarioGenerator {
        ScenarioGenerator::new(root, Arc::new(FsRunRegistry::new()))
    }

    #[test]
    fn test_singleton_lists_yield_one_scenario() {
        let dir = TempDir::new().unwrap();
        let definitions = generator(dir.path())
            .generate(0, 1, &DimensionCandidates::default())
            .unwrap();

        assert_eq!(definitions.len(), 1);
        assert!(definitions[0].parameter_file().is_file());
        assert!(definitions[0].output_dir.starts_with(dir.path()));
    }

    #[test]
    fn test_cross_product_count() {
        let dir = TempDir::new().unwrap();
        let candidates = DimensionCandidates {
            ue_speeds: vec![0, 10, 50, 100],
            clustered_ues: vec![false, true],
            fusion_algorithms: vec![6, 7, 11],
            mimo_modes: vec![0, 1, 2],
            ..DimensionCandidates::default()
        };

        let definitions = generator(dir.path()).generate(2, 5, &candidates).unwrap();
        assert_eq!(definitions.len(), 4 * 2 * 3 * 3);

        let mut ids: Vec<_> = definitions.iter().map(|d| d.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), definitions.len());
        assert!(ids.iter().all(|id| id.starts_with("batch_2/ues_5/")));
    }

    #[test]
    fn test_sweep_covers_batches_and_ue_counts() {
        let dir = TempDir::new().unwrap();
        let sweep = SweepConfig {
            batches: vec![0, 1, 2],
            ue_counts: vec![1, 2],
            candidates: DimensionCandidates {
                attackers: vec![0, 1],
                ..DimensionCandidates::default()
            },
            ..SweepConfig::default()
        };

        let definitions = generator(dir.path()).generate_sweep(&sweep).unwrap();
        assert_eq!(definitions.len(), sweep.scenario_count());
        assert_eq!(definitions.len(), 12);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let candidates = DimensionCandidates {
            attackers: vec![0, 1, 2, 5],
            ..DimensionCandidates::default()
        };

        let first = generator(dir.path()).generate(0, 1, &candidates).unwrap();
        let second = generator(dir.path()).generate(0, 1, &candidates).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_candidate_list_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let candidates = DimensionCandidates {
            frequency_bands: vec![],
            ..DimensionCandidates::default()
        };

        let err = generator(dir.path()).generate(0, 1, &candidates).unwrap_err();
        assert!(matches!(err, SimbatchError::Configuration { .. }));
        assert!(err.to_string().contains("frequency_bands"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_sweep_axes_rejected() {
        let dir = TempDir::new().unwrap();
        let sweep = SweepConfig {
            ue_counts: vec![],
            ..SweepConfig::default()
        };
        let err = generator(dir.path()).generate_sweep(&sweep).unwrap_err();
        assert!(matches!(err, SimbatchError::Configuration { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_root_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-directory");
        fs::write(&file, "").unwrap();

        let err = generator(&file.join("root"))
            .generate(0, 1, &DimensionCandidates::default())
            .unwrap_err();
        assert!(matches!(err, SimbatchError::Configuration { .. }));
    }

    #[test]
    fn test_parameter_file_contents() {
        let dir = TempDir::new().unwrap();
        let mut base = Map::new();
        base.insert("simulationTime".to_string(), Value::from(30));

        let definitions = generator(dir.path())
            .with_base_parameters(base)
            .generate(3, 10, &DimensionCandidates::default())
            .unwrap();

        let content = fs::read_to_string(definitions[0].output_dir.join(PARAMETERS_FILE)).unwrap();
        let written: Map<String, Value> = serde_json::from_str(&content).unwrap();
        assert_eq!(written, definitions[0].parameters);
        assert_eq!(written["batch"], 3);
        assert_eq!(written["numUes"], 10);
        assert_eq!(written["fusionAlgorithm"], 6);
        assert_eq!(written["simulationTime"], 30);
    }

    #[test]
    fn test_stale_parameters_are_overwritten() {
        let dir = TempDir::new().unwrap();
        let scenario_generator = generator(dir.path());
        let definitions = scenario_generator
            .generate(0, 1, &DimensionCandidates::default())
            .unwrap();
        let file = definitions[0].parameter_file();

        fs::write(&file, "stale").unwrap();
        scenario_generator
            .generate(0, 1, &DimensionCandidates::default())
            .unwrap();

        assert_ne!(fs::read_to_string(&file).unwrap(), "stale");
    }

    #[test]
    fn test_completed_scenarios_are_not_touched() {
        let dir = TempDir::new().unwrap();
        let registry = FsRunRegistry::new();
        let scenario_generator = generator(dir.path());
        let definitions = scenario_generator
            .generate(0, 1, &DimensionCandidates::default())
            .unwrap();
        let scenario = &definitions[0];

        let result = ExecutionResult::succeeded(
            scenario.id.clone(),
            scenario.output_dir.clone(),
            ResultPayload::default(),
            1,
        );
        registry.store_result(&scenario.output_dir, &result).unwrap();
        fs::write(scenario.parameter_file(), "hand edited").unwrap();

        let again = scenario_generator
            .generate(0, 1, &DimensionCandidates::default())
            .unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(
            fs::read_to_string(scenario.parameter_file()).unwrap(),
            "hand edited"
        );
        assert!(registry.is_complete(&scenario.output_dir));
    }
}
