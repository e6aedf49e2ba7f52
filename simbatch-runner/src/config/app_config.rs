//! Application configuration for the simbatch runner.
//!
//! This module handles process-level settings: the selected mode and
//! logging.

use anyhow::Result;
use std::env;
use tracing_subscriber::EnvFilter;

use super::cli::CliConfig;

/// Log level enumeration
#[derive(Debug, Clone, PartialEq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing level filter string
    pub fn to_filter_string(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// What a single invocation of the binary does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Write parameter files for the sweep, then dispatch
    GenerateAndRun,
    /// Dispatch whatever parameter files already exist under the output root
    RunExisting,
    /// Gather completed results into one aggregate file
    Collect,
}

impl RunMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "generate-and-run" | "generate" => Ok(RunMode::GenerateAndRun),
            "run-existing" | "existing" => Ok(RunMode::RunExisting),
            "collect" => Ok(RunMode::Collect),
            other => Err(anyhow::anyhow!(
                "Invalid mode '{}'. Must be 'generate-and-run', 'run-existing' or 'collect'",
                other
            )),
        }
    }

    /// Whether this mode starts simulator processes
    pub fn runs_simulator(&self) -> bool {
        !matches!(self, RunMode::Collect)
    }
}

/// Application configuration structure
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: RunMode,
    pub log_level: LogLevel,
}

impl AppConfig {
    /// Create application configuration from CLI config
    pub fn from_cli(cli_config: &CliConfig) -> Result<Self> {
        let log_level = if cli_config.verbose {
            LogLevel::Debug
        } else {
            match env::var("RUST_LOG") {
                Ok(level_str) => Self::parse_log_level(&level_str),
                Err(_) => LogLevel::Info,
            }
        };

        Ok(Self {
            mode: RunMode::parse(&cli_config.mode)?,
            log_level,
        })
    }

    /// Parse log level from string
    fn parse_log_level(level_str: &str) -> LogLevel {
        // Extract the main log level from complex RUST_LOG format
        let main_level = level_str
            .split(',')
            .next()
            .unwrap_or(level_str)
            .split('=')
            .next()
            .unwrap_or(level_str)
            .to_lowercase();

        match main_level.as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }

    /// Build the filter directive string handed to the subscriber
    fn log_filter(&self) -> String {
        if self.log_level == LogLevel::Debug || self.log_level == LogLevel::Trace {
            return self.log_level.to_filter_string().to_string();
        }

        match env::var("RUST_LOG") {
            Ok(existing_log) if !existing_log.is_empty() => existing_log,
            _ => self.log_level.to_filter_string().to_string(),
        }
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> Result<()> {
        let filter = EnvFilter::try_new(self.log_filter())
            .or_else(|_| EnvFilter::try_new(self.log_level.to_filter_string()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true)
            .with_writer(std::io::stderr)
            .compact()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

        tracing::info!("Logging initialized with level: {:?}", self.log_level);
        Ok(())
    }
}
