//! Batch run configuration: where scenarios live, which simulator runs them,
//! and how runs are bounded and post-processed.
//!
//! Everything here is passed explicitly into the generator, executor and
//! dispatcher. Nothing is read from process-wide state after construction.

use anyhow::{Context, Result};
use regex::Regex;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use simbatch_shared::FailureKind;
use simbatch_shared::sweep_json::parse_duration_string;

use super::cli::{CliConfig, OUTPUT_ROOT_ENV, SIMULATOR_ENV};
use crate::executor::ExecutorOptions;
use crate::simulator::SimulatorBinary;

/// Raw output files the executor extracts by default
pub const DEFAULT_RAW_OUTPUT_PATTERN: &str = r"\.(json|csv|txt)$";

/// What happens to raw simulator output once its result artifact is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawOutputPolicy {
    /// Leave raw output next to the artifact for debugging
    #[default]
    Keep,
    /// Delete the extracted raw files after a successful extraction
    DiscardOnSuccess,
}

/// Batch run configuration structure
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub output_root: PathBuf,
    pub simulator: Option<PathBuf>,
    pub max_workers: usize,
    pub timeout: Option<Duration>,
    pub raw_output_policy: RawOutputPolicy,
    pub raw_output_pattern: Regex,
    pub stage_binary: bool,
    pub retry_failed: Option<FailureKind>,
}

/// Number of workers used when none is configured
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl RunConfig {
    /// Create run configuration from CLI config, falling back to environment variables
    pub fn from_cli(cli_config: &CliConfig) -> Result<Self> {
        let output_root = cli_config
            .output_root
            .clone()
            .or_else(|| env::var(OUTPUT_ROOT_ENV).ok())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Output root is required (--output-root or ${})",
                    OUTPUT_ROOT_ENV
                )
            })?;

        let simulator = cli_config
            .simulator
            .clone()
            .or_else(|| env::var(SIMULATOR_ENV).ok())
            .map(PathBuf::from);

        let timeout = cli_config
            .timeout
            .as_deref()
            .map(parse_duration_string)
            .transpose()
            .map_err(|e| anyhow::anyhow!(e))?;

        let retry_failed = cli_config
            .retry_failed
            .as_deref()
            .map(str::parse::<FailureKind>)
            .transpose()?;

        let mut builder = RunConfigBuilder::new()
            .output_root(output_root)
            .stage_binary(cli_config.stage_binary)
            .raw_output_policy(if cli_config.discard_raw_output {
                RawOutputPolicy::DiscardOnSuccess
            } else {
                RawOutputPolicy::Keep
            });

        if let Some(simulator) = simulator {
            builder = builder.simulator(simulator);
        }
        if let Some(workers) = cli_config.workers {
            builder = builder.max_workers(workers);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(pattern) = &cli_config.raw_output_pattern {
            builder = builder.raw_output_pattern(pattern);
        }
        if let Some(kind) = retry_failed {
            builder = builder.retry_failed(kind);
        }

        builder.build()
    }

    /// The configured simulator, required by every mode that runs scenarios
    pub fn simulator_binary(&self) -> Result<SimulatorBinary> {
        self.simulator
            .as_ref()
            .map(SimulatorBinary::new)
            .ok_or_else(|| {
                anyhow::anyhow!("Simulator is required (--simulator or ${})", SIMULATOR_ENV)
            })
    }

    /// Options handed to each executor
    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            timeout: self.timeout,
            raw_output_policy: self.raw_output_policy,
            raw_output_pattern: self.raw_output_pattern.clone(),
        }
    }

    /// Validate run configuration
    pub fn validate(&self) -> Result<()> {
        if self.output_root.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Output root cannot be empty"));
        }

        if self.max_workers == 0 {
            return Err(anyhow::anyhow!("Worker count must be greater than 0"));
        }

        if self.timeout == Some(Duration::ZERO) {
            return Err(anyhow::anyhow!("Timeout must be greater than 0"));
        }

        Ok(())
    }
}

/// Builder pattern for RunConfig
#[derive(Default)]
pub struct RunConfigBuilder {
    output_root: Option<PathBuf>,
    simulator: Option<PathBuf>,
    max_workers: Option<usize>,
    timeout: Option<Duration>,
    raw_output_policy: Option<RawOutputPolicy>,
    raw_output_pattern: Option<String>,
    stage_binary: Option<bool>,
    retry_failed: Option<FailureKind>,
}

impl RunConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.output_root = Some(root.into());
        self
    }

    pub fn simulator<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.simulator = Some(path.into());
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn raw_output_policy(mut self, policy: RawOutputPolicy) -> Self {
        self.raw_output_policy = Some(policy);
        self
    }

    pub fn raw_output_pattern<S: Into<String>>(mut self, pattern: S) -> Self {
        self.raw_output_pattern = Some(pattern.into());
        self
    }

    pub fn stage_binary(mut self, stage: bool) -> Self {
        self.stage_binary = Some(stage);
        self
    }

    pub fn retry_failed(mut self, kind: FailureKind) -> Self {
        self.retry_failed = Some(kind);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<RunConfig> {
        let pattern = self
            .raw_output_pattern
            .unwrap_or_else(|| DEFAULT_RAW_OUTPUT_PATTERN.to_string());
        let raw_output_pattern = Regex::new(&pattern)
            .with_context(|| format!("Invalid raw output pattern '{}'", pattern))?;

        let output_root = self
            .output_root
            .ok_or_else(|| anyhow::anyhow!("Output root is required"))?;
        if output_root.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Output root cannot be empty"));
        }

        let config = RunConfig {
            output_root: resolve_path(&output_root, "output root")?,
            simulator: self
                .simulator
                .map(|path| resolve_path(&path, "simulator"))
                .transpose()?,
            max_workers: self.max_workers.unwrap_or_else(default_worker_count),
            timeout: self.timeout,
            raw_output_policy: self.raw_output_policy.unwrap_or_default(),
            raw_output_pattern,
            stage_binary: self.stage_binary.unwrap_or(false),
            retry_failed: self.retry_failed,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Anchor a path to the current directory; the simulator's own working
/// directory is the scenario directory.
fn resolve_path(path: &Path, what: &str) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Cannot resolve {} {:?}", what, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_builder_defaults() {
        let config = RunConfigBuilder::new().output_root("/sims").build().unwrap();

        assert_eq!(config.output_root, PathBuf::from("/sims"));
        assert!(config.simulator.is_none());
        assert!(config.max_workers >= 1);
        assert!(config.timeout.is_none());
        assert_eq!(config.raw_output_policy, RawOutputPolicy::Keep);
        assert!(config.raw_output_pattern.is_match("simulationOutputs.json"));
        assert!(config.raw_output_pattern.is_match("sinr.csv"));
        assert!(!config.raw_output_pattern.is_match("trace.pcap"));
        assert!(!config.stage_binary);
        assert!(config.simulator_binary().is_err());
    }

    #[test]
    fn test_run_config_builder() {
        let config = RunConfigBuilder::new()
            .output_root("/sims")
            .simulator("/opt/sim")
            .max_workers(4)
            .timeout(Duration::from_secs(60))
            .raw_output_policy(RawOutputPolicy::DiscardOnSuccess)
            .raw_output_pattern(r"^results_.*\.json$")
            .stage_binary(true)
            .retry_failed(FailureKind::Runtime)
            .build()
            .unwrap();

        assert_eq!(config.max_workers, 4);
        assert_eq!(config.timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.retry_failed, Some(FailureKind::Runtime));
        assert!(config.stage_binary);
        assert_eq!(
            config.simulator_binary().unwrap().path(),
            PathBuf::from("/opt/sim")
        );

        let options = config.executor_options();
        assert_eq!(options.timeout, Some(Duration::from_secs(60)));
        assert_eq!(options.raw_output_policy, RawOutputPolicy::DiscardOnSuccess);
        assert!(options.raw_output_pattern.is_match("results_1.json"));
    }

    #[test]
    fn test_relative_paths_are_made_absolute() {
        let config = RunConfigBuilder::new()
            .output_root("sims")
            .simulator("build/bin/sim")
            .build()
            .unwrap();

        let cwd = env::current_dir().unwrap();
        assert_eq!(config.output_root, cwd.join("sims"));
        assert_eq!(config.simulator, Some(cwd.join("build/bin/sim")));
    }

    #[test]
    fn test_empty_output_root_rejected() {
        assert!(RunConfigBuilder::new().output_root("").build().is_err());
    }

    #[test]
    fn test_run_config_builder_missing_required() {
        assert!(RunConfigBuilder::new().build().is_err());
    }

    #[test]
    fn test_run_config_validation() {
        assert!(
            RunConfigBuilder::new()
                .output_root("/sims")
                .max_workers(0)
                .build()
                .is_err()
        );
        assert!(
            RunConfigBuilder::new()
                .output_root("/sims")
                .timeout(Duration::ZERO)
                .build()
                .is_err()
        );
        assert!(
            RunConfigBuilder::new()
                .output_root("/sims")
                .raw_output_pattern("[")
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_run_config_from_cli() {
        let matches = CliConfig::build_cli()
            .try_get_matches_from([
                "simbatch",
                "--output-root",
                "/data/sims",
                "--simulator",
                "/opt/sim",
                "--workers",
                "3",
                "--timeout",
                "90s",
                "--discard-raw-output",
                "--mode",
                "run-existing",
                "--retry-failed",
                "runtime",
            ])
            .unwrap();
        let cli_config = CliConfig::from_matches(&matches).unwrap();

        let config = RunConfig::from_cli(&cli_config).unwrap();
        assert_eq!(config.output_root, PathBuf::from("/data/sims"));
        assert_eq!(config.simulator, Some(PathBuf::from("/opt/sim")));
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.raw_output_policy, RawOutputPolicy::DiscardOnSuccess);
        assert_eq!(config.retry_failed, Some(FailureKind::Runtime));
    }

    #[test]
    fn test_run_config_from_cli_bad_timeout() {
        let matches = CliConfig::build_cli()
            .try_get_matches_from(["simbatch", "-o", "/sims", "--timeout", "later"])
            .unwrap();
        let cli_config = CliConfig::from_matches(&matches).unwrap();
        assert!(RunConfig::from_cli(&cli_config).is_err());
    }
}
