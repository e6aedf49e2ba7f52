//! Configuration management module for the simbatch runner.
//!
//! This module provides centralized configuration management with support for:
//! - CLI argument parsing
//! - Environment variable fallbacks
//! - JSON5 sweep files
//! - Configuration validation
//! - Builder pattern for configuration construction

pub mod app_config;
pub mod cli;
pub mod run_config;

pub use app_config::{AppConfig, LogLevel, RunMode};
pub use cli::{CliConfig, DimensionOverrides};
pub use run_config::{RawOutputPolicy, RunConfig, RunConfigBuilder};

use anyhow::Result;
use simbatch_shared::SweepConfig;

/// Main configuration manager that combines all configuration sources
#[derive(Debug, Clone)]
pub struct ConfigManager {
    pub app: AppConfig,
    pub run: RunConfig,
    pub sweep: SweepConfig,
}

impl ConfigManager {
    /// Creates a new configuration manager from CLI arguments and environment
    pub fn from_cli_and_env() -> Result<Self> {
        let cli_config = CliConfig::from_args()?;
        Self::from_cli(&cli_config)
    }

    /// Creates a configuration manager from already parsed CLI arguments
    pub fn from_cli(cli_config: &CliConfig) -> Result<Self> {
        cli_config.validate()?;

        Ok(Self {
            app: AppConfig::from_cli(cli_config)?,
            run: RunConfig::from_cli(cli_config)?,
            sweep: cli_config.sweep_config()?,
        })
    }

    /// Validates the entire configuration
    pub fn validate(&self) -> Result<()> {
        self.run.validate()?;

        if self.app.mode.runs_simulator() {
            self.run.simulator_binary()?;
        }

        Ok(())
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> Result<()> {
        self.app.init_logging()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(args: &[&str]) -> Result<ConfigManager> {
        let matches = CliConfig::build_cli().try_get_matches_from(args).unwrap();
        ConfigManager::from_cli(&CliConfig::from_matches(&matches)?)
    }

    #[test]
    fn test_config_manager_validation() {
        let config = manager(&["simbatch", "-o", "/sims", "-s", "/opt/sim"]).unwrap();
        assert_eq!(config.app.mode, RunMode::GenerateAndRun);
        assert_eq!(config.sweep, SweepConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_collect_mode_needs_no_simulator() {
        let config = manager(&["simbatch", "-o", "/sims", "--mode", "collect"]).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_sweep_file_fails() {
        let result = manager(&[
            "simbatch",
            "-o",
            "/sims",
            "--sweep-file",
            "/nonexistent/sweep.json5",
        ]);
        assert!(result.is_err());
    }
}
