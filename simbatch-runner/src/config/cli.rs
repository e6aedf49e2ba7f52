//! CLI argument parsing for the simbatch runner.
//!
//! This module handles command line argument parsing using clap and provides
//! a structured representation of CLI configuration that can be used by
//! other configuration components.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::Path;

use simbatch_shared::SweepConfig;
use simbatch_shared::sweep_json::parse_sweep_file;

/// Environment variable naming the simulator binary
pub const SIMULATOR_ENV: &str = "SIMBATCH_SIMULATOR";

/// Environment variable naming the output root
pub const OUTPUT_ROOT_ENV: &str = "SIMBATCH_OUTPUT_ROOT";

/// Per-dimension value lists given on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DimensionOverrides {
    pub batches: Option<Vec<u32>>,
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
}

impl DimensionOverrides {
    /// Apply every list given on the command line on top of `sweep`.
    pub fn apply(&self, mut sweep: SweepConfig) -> SweepConfig {
        if let Some(count) = self.batch_count {
            sweep.batches = (0..count).collect();
        }
        if let Some(v) = &self.batches {
            sweep.batches = v.clone();
        }
        if let Some(v) = &self.ue_counts {
            sweep.ue_counts = v.clone();
        }

        let c = &mut sweep.candidates;
        if let Some(v) = &self.ue_speeds {
            c.ue_speeds = v.clone();
        }
        if let Some(v) = &self.clustered_ues {
            c.clustered_ues = v.clone();
        }
        if let Some(v) = &self.dynamic_spectrum_access {
            c.dynamic_spectrum_access = v.clone();
        }
        if let Some(v) = &self.markov {
            c.markov = v.clone();
        }
        if let Some(v) = &self.harmonic {
            c.harmonic = v.clone();
        }
        if let Some(v) = &self.fusion_algorithms {
            c.fusion_algorithms = v.clone();
        }
        if let Some(v) = &self.attackers {
            c.attackers = v.clone();
        }
        if let Some(v) = &self.frequency_bands {
            c.frequency_bands = v.clone();
        }
        if let Some(v) = &self.mimo_modes {
            c.mimo_modes = v.clone();
        }
        sweep
    }
}

/// CLI configuration structure containing all parsed command line arguments
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub verbose: bool,
    pub mode: String,
    pub output_root: Option<String>,
    pub simulator: Option<String>,
    pub workers: Option<usize>,
    pub timeout: Option<String>,
    pub sweep_file: Option<String>,
    pub dimensions: DimensionOverrides,
    pub discard_raw_output: bool,
    pub raw_output_pattern: Option<String>,
    pub stage_binary: bool,
    pub retry_failed: Option<String>,
}

fn many<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Option<Vec<T>> {
    matches
        .get_many::<T>(id)
        .map(|vals| vals.cloned().collect())
}

fn list_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .value_name("LIST")
        .value_delimiter(',')
        .action(ArgAction::Append)
        .help(help)
}

impl CliConfig {
    /// Parse CLI arguments and create CliConfig
    pub fn from_args() -> Result<Self> {
        let matches = Self::build_cli().get_matches();
        Self::from_matches(&matches)
    }

    /// Create CliConfig from pre-parsed ArgMatches (useful for testing)
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let mode = matches
            .get_one::<String>("mode")
            .ok_or_else(|| anyhow::anyhow!("Mode is required"))?
            .clone();

        let dimensions = DimensionOverrides {
            batches: many(matches, "batches"),
            batch_count: matches.get_one::<u32>("batch-count").copied(),
            ue_counts: many(matches, "ue-counts"),
            ue_speeds: many(matches, "ue-speeds"),
            clustered_ues: many(matches, "clustered-ues"),
            dynamic_spectrum_access: many(matches, "dynamic-spectrum-access"),
            markov: many(matches, "markov"),
            harmonic: many(matches, "harmonic"),
            fusion_algorithms: many(matches, "fusion-algorithms"),
            attackers: many(matches, "attackers"),
            frequency_bands: many(matches, "frequency-bands"),
            mimo_modes: many(matches, "mimo-modes"),
        };

        Ok(Self {
            verbose: matches.get_flag("verbose"),
            mode,
            output_root: matches.get_one::<String>("output-root").cloned(),
            simulator: matches.get_one::<String>("simulator").cloned(),
            workers: matches.get_one::<usize>("workers").copied(),
            timeout: matches.get_one::<String>("timeout").cloned(),
            sweep_file: matches.get_one::<String>("sweep-file").cloned(),
            dimensions,
            discard_raw_output: matches.get_flag("discard-raw-output"),
            raw_output_pattern: matches.get_one::<String>("raw-output-pattern").cloned(),
            stage_binary: matches.get_flag("stage-binary"),
            retry_failed: matches.get_one::<String>("retry-failed").cloned(),
        })
    }

    /// Build the clap Command structure
    pub fn build_cli() -> Command {
        Command::new("simbatch")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Batch runner for scenario-driven simulator sweeps")
            .long_about("Generates simulator parameter files for a cross-product of scenario \
                       dimensions, runs every scenario that has no valid result yet on a bounded \
                       worker pool, and stores each successful run as a compressed result artifact.")
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .action(ArgAction::SetTrue)
                    .help("Enable verbose logging"),
            )
            .arg(
                Arg::new("mode")
                    .short('m')
                    .long("mode")
                    .value_name("MODE")
                    .help("What to do: generate-and-run, run-existing or collect")
                    .long_help("generate-and-run writes the sweep's parameter files and runs them. \
                              run-existing runs every parameter file already under the output root, \
                              including hand-written ones. collect gathers completed results into \
                              aggregate.json.")
                    .value_parser(["generate-and-run", "run-existing", "collect"])
                    .default_value("generate-and-run"),
            )
            .arg(
                Arg::new("output-root")
                    .short('o')
                    .long("output-root")
                    .value_name("DIRECTORY")
                    .help("Root directory for scenario directories")
                    .long_help(format!(
                        "Root directory holding one subdirectory per scenario. Falls back to ${}.",
                        OUTPUT_ROOT_ENV
                    )),
            )
            .arg(
                Arg::new("simulator")
                    .short('s')
                    .long("simulator")
                    .value_name("PATH")
                    .help("Simulator executable")
                    .long_help(format!(
                        "Simulator executable, invoked once per scenario with the parameter file \
                         as its only argument. Falls back to ${}.",
                        SIMULATOR_ENV
                    )),
            )
            .arg(
                Arg::new("workers")
                    .short('j')
                    .long("workers")
                    .value_name("N")
                    .value_parser(clap::value_parser!(usize))
                    .help("Maximum concurrent simulator runs (default: CPU count)"),
            )
            .arg(
                Arg::new("timeout")
                    .long("timeout")
                    .value_name("DURATION")
                    .help("Kill a simulator run after this long, e.g. 30m or 2h"),
            )
            .arg(
                Arg::new("sweep-file")
                    .short('f')
                    .long("sweep-file")
                    .value_name("FILE")
                    .help("JSON5 file listing dimension candidates")
                    .long_help("JSON5 file listing the candidate values of each dimension and \
                              optional base parameters. Dimension flags given on the command \
                              line override the file."),
            )
            .arg(
                list_arg("batches", "Batch indices")
                    .value_parser(clap::value_parser!(u32))
                    .conflicts_with("batch-count"),
            )
            .arg(
                Arg::new("batch-count")
                    .long("batch-count")
                    .value_name("N")
                    .value_parser(clap::value_parser!(u32))
                    .help("Shorthand for --batches 0,1,...,N-1"),
            )
            .arg(list_arg("ue-counts", "UE counts").value_parser(clap::value_parser!(u32)))
            .arg(
                list_arg("ue-speeds", "UE speeds in km/h")
                    .value_parser(clap::value_parser!(u32)),
            )
            .arg(
                list_arg("clustered-ues", "Clustered UE placement flags")
                    .value_parser(clap::value_parser!(bool)),
            )
            .arg(
                list_arg("dynamic-spectrum-access", "Dynamic spectrum access flags")
                    .value_parser(clap::value_parser!(bool)),
            )
            .arg(
                list_arg("markov", "Markov model flags")
                    .value_parser(clap::value_parser!(bool)),
            )
            .arg(
                list_arg("harmonic", "Harmonic detection flags")
                    .value_parser(clap::value_parser!(bool)),
            )
            .arg(
                list_arg("fusion-algorithms", "Fusion algorithm ids")
                    .value_parser(clap::value_parser!(u32)),
            )
            .arg(
                list_arg("attackers", "Attacker ids")
                    .value_parser(clap::value_parser!(u32)),
            )
            .arg(
                list_arg("frequency-bands", "Frequency band ids")
                    .value_parser(clap::value_parser!(u32)),
            )
            .arg(
                list_arg("mimo-modes", "MIMO modes")
                    .value_parser(clap::value_parser!(u32)),
            )
            .arg(
                Arg::new("discard-raw-output")
                    .long("discard-raw-output")
                    .action(ArgAction::SetTrue)
                    .help("Delete raw simulator output after a successful extraction"),
            )
            .arg(
                Arg::new("raw-output-pattern")
                    .long("raw-output-pattern")
                    .value_name("REGEX")
                    .help("Regex selecting raw output files to extract")
                    .long_help("Regular expression matched against file names in a scenario \
                              directory to select the simulator output to extract. \
                              Default: \\.(json|csv|txt)$"),
            )
            .arg(
                Arg::new("stage-binary")
                    .long("stage-binary")
                    .action(ArgAction::SetTrue)
                    .help("Copy the simulator into the output root and run the copy"),
            )
            .arg(
                Arg::new("retry-failed")
                    .long("retry-failed")
                    .value_name("KIND")
                    .value_parser(["runtime", "extraction"])
                    .help("Only rerun scenarios whose last run failed with this kind"),
            )
    }

    /// Resolve the sweep from the sweep file (if any) and dimension flags
    pub fn sweep_config(&self) -> Result<SweepConfig> {
        let base = match &self.sweep_file {
            Some(path) => parse_sweep_file(Path::new(path))
                .with_context(|| format!("Failed to read sweep file {}", path))?,
            None => SweepConfig::default(),
        };
        Ok(self.dimensions.apply(base))
    }

    /// Validate CLI configuration
    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(anyhow::anyhow!("Worker count must be greater than 0"));
        }

        if let Some(pattern) = &self.raw_output_pattern {
            regex::Regex::new(pattern)
                .with_context(|| format!("Invalid raw output pattern '{}'", pattern))?;
        }

        if self.retry_failed.is_some() && self.mode != "run-existing" {
            return Err(anyhow::anyhow!(
                "--retry-failed only applies to run-existing mode"
            ));
        }

        Ok(())
    }
}
