//! JSON5 parsing for sweep files.
//!
//! A sweep file lists the candidate values of every scenario dimension. Any
//! dimension left out falls back to the single default value, so a minimal
//! file only names what it varies:
//!
//! ```json5
//! {
//!     batches: [0, 1, 2],
//!     ue_counts: [1, 2, 5],
//!     attackers: [0, 1, 2, 5],
//!     base: { simulationTime: "10s" },
//! }
//! ```
//!
//! Duration strings use the `duration-string` crate format:
//! "50ms", "5s", "1m", "1h", "5m30s", etc.

use duration_string::DurationString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

use crate::errors::{SweepParseError, SweepParseResult};
use crate::scenario::DimensionCandidates;

/// Parse a duration string like "50ms", "5s", "1m", "1h"
pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
    let duration: DurationString = s
        .trim()
        .parse()
        .map_err(|e| format!("Invalid duration '{}': {}", s, e))?;

    Ok(duration.into())
}

/// Everything the generator needs to expand a sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub batches: Vec<u32>,
    pub ue_counts: Vec<u32>,
    pub candidates: DimensionCandidates,
    /// Opaque parameters copied into every parameter file
    pub base_parameters: Map<String, Value>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            batches: vec![0],
            ue_counts: vec![1],
            candidates: DimensionCandidates::default(),
            base_parameters: Map::new(),
        }
    }
}

impl SweepConfig {
    /// Total number of scenarios this sweep expands to
    pub fn scenario_count(&self) -> usize {
        self.batches.len() * self.ue_counts.len() * self.candidates.combination_count()
    }
}

/// Intermediate struct for JSON5 deserialization of a sweep file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepFile {
    pub batches: Option<Vec<u32>>,
    /// Shorthand for `batches: [0, 1, ..., batch_count - 1]`
    pub batch_count: Option<u32>,
    pub ue_counts: Option<Vec<u32>>,
    pub ue_speeds: Option<Vec<u32>>,
    pub clustered_ues: Option<Vec<bool>>,
    pub dynamic_spectrum_access: Option<Vec<bool>>,
    pub markov: Option<Vec<bool>>,
    pub harmonic: Option<Vec<bool>>,
    pub fusion_algorithms: Option<Vec<u32>>,
    pub attackers: Option<Vec<u32>>,
    pub frequency_bands: Option<Vec<u32>>,
    pub mimo_modes: Option<Vec<u32>>,
    #[serde(default)]
    pub base: Map<String, Value>,
}

impl SweepFile {
    /// Convert to a [`SweepConfig`], filling omitted dimensions with defaults.
    ///
    /// Explicitly empty lists are kept as-is; rejecting them is the
    /// generator's job.
    pub fn into_config(self) -> SweepParseResult<SweepConfig> {
        let defaults = SweepConfig::default();
        let batches = match (self.batches, self.batch_count) {
            (Some(_), Some(_)) => {
                return Err(SweepParseError::Validation(
                    "'batches' and 'batch_count' are mutually exclusive".to_string(),
                ));
            }
            (Some(batches), None) => batches,
            (None, Some(count)) => (0..count).collect(),
            (None, None) => defaults.batches,
        };

        let d = defaults.candidates;
        Ok(SweepConfig {
            batches,
            ue_counts: self.ue_counts.unwrap_or(defaults.ue_counts),
            candidates: DimensionCandidates {
                ue_speeds: self.ue_speeds.unwrap_or(d.ue_speeds),
                clustered_ues: self.clustered_ues.unwrap_or(d.clustered_ues),
                dynamic_spectrum_access: self
                    .dynamic_spectrum_access
                    .unwrap_or(d.dynamic_spectrum_access),
                markov: self.markov.unwrap_or(d.markov),
                harmonic: self.harmonic.unwrap_or(d.harmonic),
                fusion_algorithms: self.fusion_algorithms.unwrap_or(d.fusion_algorithms),
                attackers: self.attackers.unwrap_or(d.attackers),
                frequency_bands: self.frequency_bands.unwrap_or(d.frequency_bands),
                mimo_modes: self.mimo_modes.unwrap_or(d.mimo_modes),
            },
            base_parameters: self.base,
        })
    }
}

/// Parse sweep JSON5 text
pub fn parse_sweep_str(content: &str) -> SweepParseResult<SweepConfig> {
    let file: SweepFile =
        json5::from_str(content).map_err(|e| SweepParseError::Json5(e.to_string()))?;
    file.into_config()
}

/// Read and parse a sweep file
pub fn parse_sweep_file(path: &Path) -> SweepParseResult<SweepConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_sweep_str(&content)
}
