//! Scenario data structures.
//!
//! A scenario is one point in the parameter cross-product handed to the
//! simulator. [`ScenarioSpec`] is the typed point itself, [`DimensionCandidates`]
//! the candidate lists a sweep expands, and [`ScenarioDefinition`] the
//! materialized form living on disk.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::PARAMETERS_FILE;

/// Unique identifier for scenarios, also their path relative to the output root
pub type ScenarioId = String;

/// One fully specified simulation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSpec {
    pub batch: u32,
    pub num_ues: u32,
    /// UE speed in km/h
    pub ue_speed: u32,
    pub clustered_ues: bool,
    pub dynamic_spectrum_access: bool,
    pub markov: bool,
    pub harmonic: bool,
    pub fusion_algorithm: u32,
    pub attacker: u32,
    pub frequency_band: u32,
    pub mimo_mode: u32,
}

impl ScenarioSpec {
    /// Deterministic id, one path segment per grouping level.
    ///
    /// Every value is encoded, so distinct specs never share an id.
    pub fn scenario_id(&self) -> ScenarioId {
        format!(
            "batch_{}/ues_{}/spd{}_clu{}_dsa{}_mkv{}_har{}_fus{}_atk{}_frq{}_mim{}",
            self.batch,
            self.num_ues,
            self.ue_speed,
            flag(self.clustered_ues),
            flag(self.dynamic_spectrum_access),
            flag(self.markov),
            flag(self.harmonic),
            self.fusion_algorithm,
            self.attacker,
            self.frequency_band,
            self.mimo_mode
        )
    }

    /// Build the simulator parameter payload for this spec.
    ///
    /// `base` holds opaque extra parameters; generated fields override any
    /// key they share with it.
    pub fn to_parameters(&self, base: &Map<String, Value>) -> Map<String, Value> {
        let mut parameters = base.clone();
        if let Ok(Value::Object(generated)) = serde_json::to_value(self) {
            parameters.extend(generated);
        }
        parameters
    }
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

/// Ordered candidate values for every named scenario dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionCandidates {
    pub ue_speeds: Vec<u32>,
    pub clustered_ues: Vec<bool>,
    pub dynamic_spectrum_access: Vec<bool>,
    pub markov: Vec<bool>,
    pub harmonic: Vec<bool>,
    pub fusion_algorithms: Vec<u32>,
    pub attackers: Vec<u32>,
    pub frequency_bands: Vec<u32>,
    pub mimo_modes: Vec<u32>,
}

impl Default for DimensionCandidates {
    /// Single-point sweep, one value per dimension.
    fn default() -> Self {
        Self {
            ue_speeds: vec![0],
            clustered_ues: vec![false],
            dynamic_spectrum_access: vec![false],
            markov: vec![false],
            harmonic: vec![false],
            fusion_algorithms: vec![6],
            attackers: vec![0],
            frequency_bands: vec![100],
            mimo_modes: vec![0],
        }
    }
}

impl DimensionCandidates {
    /// Name and length of every dimension, in expansion order.
    pub fn lengths(&self) -> [(&'static str, usize); 9] {
        [
            ("ue_speeds", self.ue_speeds.len()),
            ("clustered_ues", self.clustered_ues.len()),
            ("dynamic_spectrum_access", self.dynamic_spectrum_access.len()),
            ("markov", self.markov.len()),
            ("harmonic", self.harmonic.len()),
            ("fusion_algorithms", self.fusion_algorithms.len()),
            ("attackers", self.attackers.len()),
            ("frequency_bands", self.frequency_bands.len()),
            ("mimo_modes", self.mimo_modes.len()),
        ]
    }

    /// Name of the first dimension with no candidates, if any.
    pub fn first_empty(&self) -> Option<&'static str> {
        self.lengths()
            .into_iter()
            .find(|(_, len)| *len == 0)
            .map(|(name, _)| name)
    }

    /// Number of combinations for one batch and UE count.
    pub fn combination_count(&self) -> usize {
        self.lengths().iter().map(|(_, len)| len).product()
    }
}

/// One materialized scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub id: ScenarioId,
    /// Parameter payload as written to the parameter file
    pub parameters: Map<String, Value>,
    pub output_dir: PathBuf,
    /// Typed spec, absent for scenarios discovered on disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ScenarioSpec>,
}

impl ScenarioDefinition {
    pub fn from_spec(
        output_root: &Path,
        spec: ScenarioSpec,
        base_parameters: &Map<String, Value>,
    ) -> Self {
        let id = spec.scenario_id();
        Self {
            output_dir: output_root.join(&id),
            parameters: spec.to_parameters(base_parameters),
            id,
            spec: Some(spec),
        }
    }

    pub fn parameter_file(&self) -> PathBuf {
        self.output_dir.join(PARAMETERS_FILE)
    }
}
