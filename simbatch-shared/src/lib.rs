//! Shared types for simbatch.
//!
//! This crate holds the data model exchanged between the scenario generator,
//! the executor and anything downstream that reads results back: scenario
//! specs and definitions, execution results, the error taxonomy, and sweep
//! file parsing.
//!
//! # On-disk layout
//!
//! ```text
//! <output root>/
//!   batch_<b>/ues_<n>/<dimension slug>/
//!     simulationParameters.json   written by the generator
//!     simulation.log              simulator stdout/stderr
//!     ...                         raw simulator output
//!     outputs.json.gz             result artifact, marks completion
//!     failure.json                last failure, if the run failed
//! ```
//!
//! # Key Components
//!
//! * [`scenario`] - Scenario specs, candidate lists and definitions
//! * [`result`] - [`result::ExecutionResult`] and the artifact envelope
//! * [`errors`] - Fatal errors and per-scenario failures
//! * [`sweep_json`] - JSON5 sweep file parsing

pub mod errors;
pub mod result;
pub mod scenario;
pub mod sweep_json;

pub use errors::{FailureKind, ScenarioFailure, SimbatchError, SimbatchResult};
pub use result::{ExecutionResult, Outcome, ResultEnvelope, ResultPayload};
pub use scenario::{DimensionCandidates, ScenarioDefinition, ScenarioId, ScenarioSpec};
pub use sweep_json::SweepConfig;

/// Parameter file the simulator consumes
pub const PARAMETERS_FILE: &str = "simulationParameters.json";

/// Compressed result artifact whose validity marks a scenario complete
pub const RESULT_ARTIFACT_FILE: &str = "outputs.json.gz";

/// Record of the most recent failed run
pub const FAILURE_FILE: &str = "failure.json";

/// Captured simulator stdout and stderr
pub const SIMULATION_LOG_FILE: &str = "simulation.log";

/// Names the harness itself writes into a scenario directory
pub const HARNESS_FILES: [&str; 4] = [
    PARAMETERS_FILE,
    RESULT_ARTIFACT_FILE,
    FAILURE_FILE,
    SIMULATION_LOG_FILE,
];
