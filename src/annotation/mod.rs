pub mod annotator;
pub mod inline_stack;

// Re-export key types from the annotation module
pub use annotator::{AnnotationOutcome, AnnotationReport, BlockSamples, CfgAnnotator, MIN_SAMPLE_BB_COUNT};
pub use inline_stack::{callsite_stack, inline_stack, InlineCallStack};
