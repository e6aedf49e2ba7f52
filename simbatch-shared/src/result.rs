//! Execution results and the on-disk records built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::errors::{FailureKind, ScenarioFailure};
use crate::scenario::ScenarioId;

/// Format tag written into every result artifact
pub const RESULT_FORMAT: &str = "simbatch-result";

/// Current artifact layout version
pub const RESULT_VERSION: u32 = 1;

/// How a single scenario run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed { failure: ScenarioFailure },
}

/// Data extracted from the simulator's raw output files.
///
/// Keys are file names relative to the scenario directory. JSON files are
/// stored parsed, anything else as text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub files: BTreeMap<String, Value>,
}

impl ResultPayload {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Normalized, durable record of one scenario's outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub scenario_id: ScenarioId,
    pub outcome: Outcome,
    /// Directory holding the simulator's raw output
    pub raw_output_dir: PathBuf,
    /// Extracted data, present only on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResultPayload>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn succeeded(
        scenario_id: ScenarioId,
        raw_output_dir: PathBuf,
        payload: ResultPayload,
        duration_ms: u64,
    ) -> Self {
        Self {
            scenario_id,
            outcome: Outcome::Succeeded,
            raw_output_dir,
            payload: Some(payload),
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(
        scenario_id: ScenarioId,
        raw_output_dir: PathBuf,
        failure: ScenarioFailure,
        duration_ms: u64,
    ) -> Self {
        Self {
            scenario_id,
            outcome: Outcome::Failed { failure },
            raw_output_dir,
            payload: None,
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded)
    }

    pub fn failure(&self) -> Option<&ScenarioFailure> {
        match &self.outcome {
            Outcome::Succeeded => None,
            Outcome::Failed { failure } => Some(failure),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure().map(ScenarioFailure::kind)
    }
}

/// Self-describing wrapper stored (gzip-compressed) as the result artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub format: String,
    pub version: u32,
    pub result: ExecutionResult,
}

impl ResultEnvelope {
    pub fn new(result: ExecutionResult) -> Self {
        Self {
            format: RESULT_FORMAT.to_string(),
            version: RESULT_VERSION,
            result,
        }
    }

    /// Whether this envelope describes a finished, successful run
    pub fn is_valid_completion(&self) -> bool {
        self.format == RESULT_FORMAT
            && self.version == RESULT_VERSION
            && self.result.is_success()
            && self.result.payload.is_some()
    }
}
