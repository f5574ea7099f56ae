use std::sync::Arc;

use crate::error::Error;
use crate::format::FileHeader;
use crate::index::sample_map::{FlatKey, InlineKey, MapStatistics, SampleKey, SampleMap};
use crate::model::{
    FlatSampleRecord, InlineFrame, InlineSampleRecord, InlineStack, MatchedRecord, ProfileUnit,
    RecordId, SampleCount, SourceLocation,
};
use crate::parser::string_table::StringTable;

/// Result of a successful index lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedSample {
    pub record: MatchedRecord,
    pub count: SampleCount,
}

/// In-memory sample index built from one profile file.
///
/// Records live in two arenas owned by the store; the flat and inline
/// indices map keys to positions in those arenas. The store is filled once
/// by the reader and only queried afterwards.
#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    unit: ProfileUnit,
    flat_records: Vec<FlatSampleRecord>,
    inline_records: Vec<InlineSampleRecord>,
    flat_index: SampleMap<FlatKey>,
    inline_index: SampleMap<InlineKey>,
    max_count: u64,
    num_samples: u64,
}

impl SampleStore {
    /// Create an empty store over a profile unit
    pub fn new(unit: ProfileUnit) -> Self {
        Self {
            unit,
            ..Default::default()
        }
    }

    pub fn header(&self) -> &FileHeader {
        &self.unit.header
    }

    pub fn strings(&self) -> &StringTable {
        &self.unit.strings
    }

    pub(crate) fn strings_mut(&mut self) -> &mut StringTable {
        &mut self.unit.strings
    }

    /// Number of distinct line samples inserted, excluding callsite totals
    pub fn num_samples(&self) -> u64 {
        self.num_samples
    }

    /// Largest sample frequency seen anywhere in the file
    pub fn max_count(&self) -> u64 {
        self.max_count
    }

    pub fn flat_statistics(&self) -> MapStatistics {
        self.flat_index.statistics()
    }

    pub fn inline_statistics(&self) -> MapStatistics {
        self.inline_index.statistics()
    }

    pub fn flat_record(&self, id: RecordId) -> Option<&FlatSampleRecord> {
        self.flat_records.get(id)
    }

    pub fn inline_record(&self, id: RecordId) -> Option<&InlineSampleRecord> {
        self.inline_records.get(id)
    }

    /// Insert a flat record; a duplicate key is reported and the first record kept.
    ///
    /// Returns whether the record was inserted.
    pub fn insert_flat(&mut self, record: FlatSampleRecord) -> bool {
        self.max_count = self.max_count.max(record.freq);

        let key = FlatKey {
            filename: record.filename,
            func_name: record.func_name,
            line: record.line,
        };
        let id = self.flat_records.len();
        match self.flat_index.insert_if_absent(key.clone(), id) {
            Ok(()) => {
                self.flat_records.push(record);
                self.num_samples += 1;
                true
            }
            Err(_) => {
                self.report_duplicate(&key);
                false
            }
        }
    }

    /// Insert an inline record; a duplicate key is reported and the first record kept.
    ///
    /// Callsite totals neither count as samples nor raise the file maximum.
    pub fn insert_inline(&mut self, record: InlineSampleRecord) -> bool {
        let is_total = record.is_callsite_total();
        if !is_total {
            self.max_count = self.max_count.max(record.freq);
        }

        let key = InlineKey {
            stack: Arc::clone(&record.stack),
            filename: record.filename,
            func_name: record.func_name,
            line: record.line,
        };
        let id = self.inline_records.len();
        match self.inline_index.insert_if_absent(key.clone(), id) {
            Ok(()) => {
                self.inline_records.push(record);
                if !is_total {
                    self.num_samples += 1;
                }
                true
            }
            Err(_) => {
                self.report_duplicate(&key);
                false
            }
        }
    }

    fn report_duplicate<K: SampleKey>(&self, key: &K) {
        let error = Error::DuplicateSample(key.describe(self.strings()));
        log::warn!("{}", error);
    }

    /// Exact lookup of a non-inlined line
    pub fn lookup_flat(&self, filename: &str, func_name: &str, line: u32) -> Option<MatchedSample> {
        let strings = self.strings();
        let key = FlatKey {
            filename: strings.lookup(filename)?,
            func_name: strings.lookup(func_name)?,
            line,
        };
        let id = self.flat_index.get(&key)?;
        let record = &self.flat_records[id];
        Some(MatchedSample {
            record: MatchedRecord::Flat(id),
            count: SampleCount {
                freq: record.freq,
                num_instr: record.num_instr,
            },
        })
    }

    /// Exact lookup of an inlined line under the given call stack (leaf first)
    pub fn lookup_inline(
        &self,
        stack: &[&SourceLocation],
        filename: &str,
        func_name: &str,
        line: u32,
    ) -> Option<MatchedSample> {
        let strings = self.strings();
        let key = InlineKey {
            stack: self.intern_stack(stack)?,
            filename: strings.lookup(filename)?,
            func_name: strings.lookup(func_name)?,
            line,
        };
        let id = self.inline_index.get(&key)?;
        let record = &self.inline_records[id];
        Some(MatchedSample {
            record: MatchedRecord::Inline(id),
            count: SampleCount {
                freq: record.freq,
                num_instr: record.num_instr,
            },
        })
    }

    /// Total samples of one inline instantiation, or 0 if it was never sampled
    pub fn callsite_total(&self, stack: &[&SourceLocation], filename: &str, func_name: &str) -> u64 {
        self.lookup_inline(stack, filename, func_name, 0)
            .map(|matched| matched.count.freq)
            .unwrap_or(0)
    }

    /// Map a host-side stack onto profile symbols; `None` if any file is unknown
    fn intern_stack(&self, stack: &[&SourceLocation]) -> Option<InlineStack> {
        let strings = self.strings();
        stack
            .iter()
            .map(|location| {
                strings.lookup(&location.file).map(|file| InlineFrame {
                    file,
                    line: location.line,
                })
            })
            .collect::<Option<Vec<_>>>()
            .map(Arc::from)
    }
}
