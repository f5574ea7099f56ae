use thiserror::Error;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed sample profile: {0}")]
    FormatError(String),

    #[error("Failed to load sample profile from {0}: {1}")]
    ProfileLoadError(PathBuf, String),

    #[error("Conflicting profile configuration: {0}")]
    ConfigConflict(String),

    #[error("Invalid profile configuration: {0}")]
    ConfigError(#[from] serde_json::Error),

    #[error("Duplicate sample entry: {0}")]
    DuplicateSample(String),

    #[error("Inline call stack depth {depth} exceeds the maximum of {max}")]
    Overflow { depth: usize, max: usize },

    #[error("Invalid control-flow graph: {0}")]
    InvalidGraph(String),

    #[error("Failed to write CFG profile dump to {0}: {1}")]
    DumpError(PathBuf, String),
}
