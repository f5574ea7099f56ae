use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::format::FileHeader;
use crate::parser::string_table::{StringTable, Symbol};

/// Index of a record inside one of the store's record arenas
pub type RecordId = usize;

/// A host-side source location (file name and line) attached to a statement
/// or to an enclosing lexical scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One frame of a profiled inline call stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InlineFrame {
    pub file: Symbol,
    pub line: u32,
}

/// Inline call stack shared by every record of one inline instantiation.
/// Frames are ordered leaf (innermost call site) to root.
pub type InlineStack = Arc<[InlineFrame]>;

/// Sample data for one (file, function, line) of a non-inlined function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatSampleRecord {
    pub filename: Symbol,
    pub func_name: Symbol,
    pub line: u32,
    pub freq: u64,
    pub num_instr: u32,
}

/// Sample data for one line of an inlined function body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineSampleRecord {
    pub stack: InlineStack,
    pub filename: Symbol,
    pub func_name: Symbol,
    pub line: u32,
    pub freq: u64,
    pub num_instr: u32,
}

impl InlineSampleRecord {
    /// Depth of the inline call stack
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Whether this is the synthetic line-0 record holding the callsite total
    pub fn is_callsite_total(&self) -> bool {
        self.line == 0
    }
}

/// Identity of a matched record, used to count a record once per block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchedRecord {
    Flat(RecordId),
    Inline(RecordId),
}

/// Sample frequency and instruction count of a matched record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleCount {
    pub freq: u64,
    pub num_instr: u32,
}

/// Profile summary published once a function has been annotated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileSummary {
    /// Number of profiled runs; sample profiles always count as one run
    pub runs: u32,
    /// Maximum sample frequency observed across the whole profile file
    pub sum_max: u64,
}

impl ProfileSummary {
    pub fn from_max_count(max_count: u64) -> Self {
        Self {
            runs: 1,
            sum_max: max_count,
        }
    }
}

/// Header and string table of a loaded profile file
#[derive(Debug, Clone, Default)]
pub struct ProfileUnit {
    pub header: FileHeader,
    pub strings: StringTable,
}
