use std::path::PathBuf;

use crate::cfg::Function;
use crate::dump::{dump_cfg_profile, DumpKind};
use crate::error::Result;
use crate::passes::pass_manager::{PassResult, ProfilePass};
use crate::session::ProfileSession;

/// Appends each function's edge profile to the comparison dump file
pub struct ProfileDumpPass {
    name: String,
}

impl Default for ProfileDumpPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileDumpPass {
    pub fn new() -> Self {
        Self {
            name: "profile_dump".to_string(),
        }
    }

    /// Dump file for the active profile mode
    pub fn dump_path(session: &ProfileSession) -> PathBuf {
        let options = session.options();
        let kind = if options.branch_probabilities {
            DumpKind::Branch
        } else {
            DumpKind::Sample
        };
        match &options.dump_dir {
            Some(dir) => dir.join(kind.file_name()),
            None => PathBuf::from(kind.file_name()),
        }
    }
}

impl ProfilePass for ProfileDumpPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn gate(&self, session: &ProfileSession) -> bool {
        let options = session.options();
        options.profile_dump && (options.sample_profile || options.branch_probabilities)
    }

    fn execute(&self, session: &ProfileSession, function: &mut Function) -> Result<PassResult> {
        let path = Self::dump_path(session);
        if let Err(error) = dump_cfg_profile(&path, function) {
            log::warn!("Cannot dump CFG profile of {}: {}", function.name, error);
        }
        Ok(PassResult::unchanged(&self.name))
    }

    fn dependencies(&self) -> Vec<&str> {
        vec!["sample_profile"]
    }
}
