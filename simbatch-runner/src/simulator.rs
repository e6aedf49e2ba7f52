//! Simulator binary handling: usability checks and staging.

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use simbatch_shared::{SimbatchError, SimbatchResult};

/// Path to the external simulator executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorBinary {
    path: PathBuf,
}

impl SimulatorBinary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fail with `SimulatorInvocation` unless the binary is an executable file.
    pub fn check(&self) -> SimbatchResult<()> {
        let metadata = std::fs::metadata(&self.path).map_err(|e| {
            SimbatchError::invocation(&self.path, format!("cannot stat simulator: {}", e))
        })?;

        if !metadata.is_file() {
            return Err(SimbatchError::invocation(&self.path, "not a regular file"));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o111 == 0 {
                return Err(SimbatchError::invocation(&self.path, "not executable"));
            }
        }

        Ok(())
    }

    /// Copy the binary into `dir` and return a handle to the copy.
    #[instrument(skip(self), fields(simulator = %self.path.display()))]
    pub fn stage_into(&self, dir: &Path) -> SimbatchResult<SimulatorBinary> {
        self.check()?;
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| SimbatchError::invocation(&self.path, "path has no file name"))?;
        let target = dir.join(file_name);

        if target != self.path {
            std::fs::create_dir_all(dir)?;
            std::fs::copy(&self.path, &target).map_err(|e| {
                SimbatchError::invocation(&self.path, format!("cannot stage into {:?}: {}", dir, e))
            })?;
            info!("Staged simulator binary to {:?}", target);
        }

        Ok(SimulatorBinary::new(target))
    }
}
