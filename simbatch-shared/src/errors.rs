use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Batch-fatal error types for simbatch.
///
/// Anything in here stops the whole pass. Per-scenario problems are
/// reported through [`ScenarioFailure`] instead.
#[derive(Error, Debug)]
pub enum SimbatchError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Simulator binary {path:?} cannot be invoked: {message}")]
    SimulatorInvocation { path: PathBuf, message: String },

    #[error("Scenario file error in {path:?}: {message}")]
    ScenarioFile { path: PathBuf, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimbatchError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SimbatchError::Configuration {
            message: message.into(),
        }
    }

    pub fn invocation(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        SimbatchError::SimulatorInvocation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for errors that make every remaining scenario pointless to run.
    pub fn is_invocation(&self) -> bool {
        matches!(self, SimbatchError::SimulatorInvocation { .. })
    }
}

/// Failure of a single scenario, recorded as data and never propagated
/// across the dispatcher boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioFailure {
    /// The simulator ran but exited non-zero, was killed, or timed out.
    #[error("Simulator run failed (exit code {exit_code:?}): {message}")]
    SimulatorRuntime {
        exit_code: Option<i32>,
        timed_out: bool,
        message: String,
    },

    /// The simulator succeeded but its output could not be turned into a result.
    #[error("Result extraction failed: {message}")]
    ResultExtraction { message: String },
}

impl ScenarioFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            ScenarioFailure::SimulatorRuntime { .. } => FailureKind::Runtime,
            ScenarioFailure::ResultExtraction { .. } => FailureKind::Extraction,
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        ScenarioFailure::ResultExtraction {
            message: message.into(),
        }
    }
}

/// Coarse failure category, used to select scenarios for a targeted retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Runtime,
    Extraction,
}

impl std::str::FromStr for FailureKind {
    type Err = SimbatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "runtime" => Ok(FailureKind::Runtime),
            "extraction" => Ok(FailureKind::Extraction),
            other => Err(SimbatchError::configuration(format!(
                "Invalid failure kind '{}'. Must be 'runtime' or 'extraction'",
                other
            ))),
        }
    }
}

/// Errors raised while reading a JSON5 sweep file
#[derive(Error, Debug)]
pub enum SweepParseError {
    #[error("JSON5 parse error: {0}")]
    Json5(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SweepParseError> for SimbatchError {
    fn from(err: SweepParseError) -> Self {
        SimbatchError::configuration(err.to_string())
    }
}

/// Result type aliases for convenience
pub type SimbatchResult<T> = Result<T, SimbatchError>;
pub type SweepParseResult<T> = Result<T, SweepParseError>;
