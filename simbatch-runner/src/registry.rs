//! Run registry: which scenarios are already done.
//!
//! Completion is never tracked in an index. It is derived on every call from
//! the result artifact sitting in the scenario directory, so a pass always
//! sees the current state of the filesystem.
//!
//! Artifacts are written to a temporary sibling and renamed into place. A
//! batch killed mid-write therefore leaves either no artifact or a stray
//! temp file, and anything that does not decode cleanly counts as
//! incomplete.

use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::{debug, warn};

use simbatch_shared::{
    ExecutionResult, FAILURE_FILE, RESULT_ARTIFACT_FILE, ResultEnvelope, ScenarioFailure,
    SimbatchResult,
};

/// Completion check and result storage for scenario directories.
///
/// Implementations must be safe to call concurrently for different
/// scenarios.
pub trait RunRegistry: Send + Sync {
    /// True iff a well-formed, successful result exists for this scenario.
    fn is_complete(&self, scenario_dir: &Path) -> bool;

    /// Load the stored successful result, if any.
    fn load(&self, scenario_dir: &Path) -> Option<ExecutionResult>;

    /// Persist a successful result as the scenario's artifact.
    fn store_result(&self, scenario_dir: &Path, result: &ExecutionResult) -> SimbatchResult<()>;

    /// Persist a failed result for later inspection or targeted retry.
    fn store_failure(&self, scenario_dir: &Path, result: &ExecutionResult) -> SimbatchResult<()>;

    /// The failure recorded by the most recent failed run, if any.
    fn last_failure(&self, scenario_dir: &Path) -> Option<ScenarioFailure>;
}

/// Filesystem-backed registry using `outputs.json.gz` and `failure.json`
#[derive(Debug, Clone, Default)]
pub struct FsRunRegistry;

impl FsRunRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn artifact_path(scenario_dir: &Path) -> PathBuf {
        scenario_dir.join(RESULT_ARTIFACT_FILE)
    }

    pub fn failure_path(scenario_dir: &Path) -> PathBuf {
        scenario_dir.join(FAILURE_FILE)
    }
}

impl RunRegistry for FsRunRegistry {
    fn is_complete(&self, scenario_dir: &Path) -> bool {
        self.load(scenario_dir).is_some()
    }

    fn load(&self, scenario_dir: &Path) -> Option<ExecutionResult> {
        let path = Self::artifact_path(scenario_dir);
        if !path.is_file() {
            return None;
        }

        match read_artifact(&path) {
            Ok(envelope) if envelope.is_valid_completion() => Some(envelope.result),
            Ok(envelope) => {
                debug!(
                    "Ignoring artifact {:?} (format {} v{}, success {})",
                    path,
                    envelope.format,
                    envelope.version,
                    envelope.result.is_success()
                );
                None
            }
            Err(e) => {
                warn!("Treating unreadable artifact {:?} as incomplete: {}", path, e);
                None
            }
        }
    }

    fn store_result(&self, scenario_dir: &Path, result: &ExecutionResult) -> SimbatchResult<()> {
        write_artifact(
            &Self::artifact_path(scenario_dir),
            &ResultEnvelope::new(result.clone()),
        )?;

        let failure = Self::failure_path(scenario_dir);
        if failure.exists() {
            fs::remove_file(&failure)?;
        }
        Ok(())
    }

    fn store_failure(&self, scenario_dir: &Path, result: &ExecutionResult) -> SimbatchResult<()> {
        let content = serde_json::to_vec_pretty(result)?;
        write_atomically(&Self::failure_path(scenario_dir), &content)
    }

    fn last_failure(&self, scenario_dir: &Path) -> Option<ScenarioFailure> {
        let content = fs::read(Self::failure_path(scenario_dir)).ok()?;
        let result: ExecutionResult = serde_json::from_slice(&content).ok()?;
        result.failure().cloned()
    }
}

/// Gzip-compress an envelope and move it into place atomically
pub fn write_artifact(path: &Path, envelope: &ResultEnvelope) -> SimbatchResult<()> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    serde_json::to_writer(&mut encoder, envelope)?;
    let compressed = encoder.finish()?;
    write_atomically(path, &compressed)
}

/// Decode an artifact written by [`write_artifact`]
pub fn read_artifact(path: &Path) -> SimbatchResult<ResultEnvelope> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    Ok(serde_json::from_reader(decoder)?)
}

fn write_atomically(path: &Path, content: &[u8]) -> SimbatchResult<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}
