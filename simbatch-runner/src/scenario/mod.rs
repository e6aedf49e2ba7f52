//! Scenario preparation: generating parameter files for a sweep and
//! discovering scenario directories that already exist.

pub mod generator;
pub mod loader;

pub use generator::ScenarioGenerator;
pub use loader::ScenarioLoader;
