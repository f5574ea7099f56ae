use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::format::DEFAULT_SAMPLE_DATAFILE;

/// Options controlling sample-profile use during one compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleProfileOptions {
    /// Profile file; `sp.data` when unset
    pub profile_path: Option<PathBuf>,
    /// Annotate CFGs from the sample profile
    pub sample_profile: bool,
    /// Use recorded edge counters instead; excludes `sample_profile`
    pub branch_probabilities: bool,
    /// Append per-edge profile dumps for comparison tooling
    pub profile_dump: bool,
    /// Directory receiving dump files; the working directory when unset
    pub dump_dir: Option<PathBuf>,
}

impl Default for SampleProfileOptions {
    fn default() -> Self {
        Self {
            profile_path: None,
            sample_profile: false,
            branch_probabilities: false,
            profile_dump: false,
            dump_dir: None,
        }
    }
}

impl SampleProfileOptions {
    /// Create a new options object
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load options from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Set the profile file
    pub fn set_profile_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_path = Some(path.into());
        self
    }

    /// Enable or disable sample profile annotation
    pub fn enable_sample_profile(mut self, enable: bool) -> Self {
        self.sample_profile = enable;
        self
    }

    /// Enable or disable the recorded edge counter mode
    pub fn enable_branch_probabilities(mut self, enable: bool) -> Self {
        self.branch_probabilities = enable;
        self
    }

    /// Enable or disable CFG profile dumps
    pub fn enable_profile_dump(mut self, enable: bool) -> Self {
        self.profile_dump = enable;
        self
    }

    /// Set the directory dump files are written to
    pub fn set_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    /// Profile file to read
    pub fn profile_path(&self) -> &Path {
        self.profile_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_SAMPLE_DATAFILE))
    }

    /// Fail with [`Error::ConfigConflict`] if both profile modes are requested
    pub fn check_modes(&self) -> Result<()> {
        if self.sample_profile && self.branch_probabilities {
            return Err(Error::ConfigConflict(
                "cannot use both branch probabilities and sample profile; sample profile disabled"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Drop sample profiling when it conflicts with the edge counter mode.
    ///
    /// The conflict is reported as a warning and never fails.
    pub fn resolve_conflicts(&mut self) {
        if let Err(error) = self.check_modes() {
            log::warn!("{}", error);
            self.sample_profile = false;
        }
    }
}
