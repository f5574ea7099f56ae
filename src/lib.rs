pub mod error;
pub mod format;
pub mod model;
pub mod parser;
pub mod index;
pub mod cfg;
pub mod annotation;
pub mod smoothing;
pub mod options;
pub mod session;
pub mod passes;
pub mod dump;

// Re-export commonly used types
pub use error::{Error, Result};
pub use model::{SourceLocation, ProfileSummary, FlatSampleRecord, InlineSampleRecord, InlineFrame, MatchedRecord};
pub use parser::{SampleProfileReader, StringTable, Symbol};
pub use index::{SampleStore, MatchedSample};
pub use cfg::{ControlFlowGraph, Function, BasicBlock, BlockId, Statement, LexicalScope, ProfileStatus};
pub use annotation::{CfgAnnotator, AnnotationReport, AnnotationOutcome};
pub use smoothing::{FlowSmoother, ProbabilityEstimator, EdgeDerivationSmoother, UniformProbabilityEstimator};
pub use options::SampleProfileOptions;
pub use session::ProfileSession;
pub use passes::{PassManager, ProfilePass, PassResult, PassStats, SampleProfilePass, ProfileDumpPass};
