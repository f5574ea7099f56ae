pub mod pass_manager;
pub mod profile_dump;
pub mod sample_profile;

pub use pass_manager::{PassManager, PassResult, PassStats, ProfilePass};
pub use profile_dump::ProfileDumpPass;
pub use sample_profile::SampleProfilePass;
