//! Library crate for the simbatch runner
//!
//! Exposes the generator, registry, executor and dispatcher so they can be
//! driven from integration tests as well as from the `simbatch` binary.

pub mod aggregate;
pub mod batch;
pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod registry;
pub mod scenario;
pub mod simulator;

pub use batch::BatchOutcome;
pub use dispatcher::{DispatchReport, DispatchSummary, Dispatcher};
pub use executor::{Executor, ExecutorOptions};
pub use registry::{FsRunRegistry, RunRegistry};
pub use scenario::{ScenarioGenerator, ScenarioLoader};
pub use simulator::SimulatorBinary;
