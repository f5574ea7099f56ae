use std::collections::HashSet;

use serde::Serialize;
use strum_macros::{AsRefStr, Display};

use crate::annotation::inline_stack::{callsite_stack, inline_stack};
use crate::cfg::{BlockId, Function, ProfileStatus, Statement};
use crate::error::{Error, Result};
use crate::index::{MatchedSample, SampleStore};
use crate::model::{MatchedRecord, ProfileSummary};
use crate::smoothing::{FlowSmoother, ProbabilityEstimator};

/// Functions with fewer blocks than this (entry and exit included) are
/// accepted with a single sampled block
pub const MIN_SAMPLE_BB_COUNT: usize = 5;

/// Samples matched by the statements of one basic block
#[derive(Debug, Clone, Default)]
pub struct BlockSamples {
    /// Statements carrying a source location
    pub num_ir: usize,
    pub sum_freq: u64,
    pub num_instr_sampled: u64,
    pub max_freq: u64,
    matched: HashSet<MatchedRecord>,
}

impl BlockSamples {
    /// Add a matched record; a record already counted for this block is ignored.
    ///
    /// Returns whether the record was counted.
    pub fn record(&mut self, sample: MatchedSample) -> bool {
        if !self.matched.insert(sample.record) {
            return false;
        }
        self.sum_freq = self.sum_freq.saturating_add(sample.count.freq);
        self.num_instr_sampled = self
            .num_instr_sampled
            .saturating_add(u64::from(sample.count.num_instr));
        self.max_freq = self.max_freq.max(sample.count.freq);
        true
    }

    /// Number of distinct records counted
    pub fn matched_records(&self) -> usize {
        self.matched.len()
    }

    /// Block count: matched frequency averaged over sampled instructions
    pub fn average_count(&self) -> u64 {
        if self.num_instr_sampled > 0 {
            self.sum_freq / self.num_instr_sampled
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
pub enum AnnotationOutcome {
    /// Counts accepted and handed to the flow smoother
    Smoothed,
    /// Too few sampled blocks; counts were reset
    Rejected,
}

/// Outcome of annotating one function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotationReport {
    pub function: String,
    pub blocks_annotated: usize,
    /// Blocks in the graph, entry and exit included
    pub total_blocks: usize,
    pub func_max_count: u64,
    pub outcome: AnnotationOutcome,
    pub summary: Option<ProfileSummary>,
}

/// Assigns sample-derived execution counts to the blocks of a function
pub struct CfgAnnotator<'a> {
    store: &'a SampleStore,
    smoother: &'a dyn FlowSmoother,
    estimator: &'a dyn ProbabilityEstimator,
}

impl<'a> CfgAnnotator<'a> {
    pub fn new(
        store: &'a SampleStore,
        smoother: &'a dyn FlowSmoother,
        estimator: &'a dyn ProbabilityEstimator,
    ) -> Self {
        Self {
            store,
            smoother,
            estimator,
        }
    }

    /// Annotate a function whose inlining decisions are final.
    ///
    /// On the first profiling pass over a function without counts, static
    /// probabilities are estimated before the samples are applied. If
    /// annotation fails the block counts are reset.
    pub fn execute(&self, function: &mut Function) -> Result<AnnotationReport> {
        if !function.after_profile && !function.cfg.has_counts() {
            self.estimator.estimate(&mut function.cfg)?;
            function.profile_status = ProfileStatus::Absent;
        }

        let report = self.annotate_cfg(function);
        function.after_profile = true;
        if report.is_err() {
            Self::reset_counts(function)?;
        }
        report
    }

    /// Annotate every block, then keep or discard the counts
    pub fn annotate_cfg(&self, function: &mut Function) -> Result<AnnotationReport> {
        log::debug!(
            "Annotate CFG for function {} with sample profile: n_basic_blocks={}, n_edges={}",
            function.name,
            function.cfg.n_basic_blocks(),
            function.cfg.n_edges()
        );
        log::trace!(
            "flat index {:?}, inline index {:?}",
            self.store.flat_statistics(),
            self.store.inline_statistics()
        );

        let mut blocks_annotated = 0usize;
        let mut func_max_count = 0u64;
        for block in function.cfg.blocks() {
            let samples = self.annotate_block(function, block)?;
            let count = samples.average_count();

            let bb = function.cfg.block_mut(block)?;
            bb.count = count;
            bb.max_sample = samples.max_freq;
            log::trace!(
                "BB{}: average_count={}, maximal_count={}, num_ir={}, num_instr_sampled={}",
                bb.index,
                count,
                samples.max_freq,
                samples.num_ir,
                samples.num_instr_sampled
            );

            if count > 0 {
                blocks_annotated += 1;
                func_max_count = func_max_count.max(count);
            }
        }

        let total_blocks = function.cfg.n_basic_blocks();
        log::debug!(
            "{} of {} BBs are sampled. func_max_count={}, sp_max_count={}",
            blocks_annotated,
            total_blocks.saturating_sub(2),
            func_max_count,
            self.store.max_count()
        );

        let (outcome, summary) = if Self::is_usable(blocks_annotated, total_blocks) {
            log::debug!("Smoothing {} with {}", function.name, self.smoother.name());
            self.smoother.smooth(&mut function.cfg)?;
            let summary = ProfileSummary::from_max_count(self.store.max_count());
            function.profile_status = ProfileStatus::Read;
            function.profile_summary = Some(summary);
            (AnnotationOutcome::Smoothed, Some(summary))
        } else {
            Self::reset_counts(function)?;
            (AnnotationOutcome::Rejected, None)
        };

        Ok(AnnotationReport {
            function: function.name.clone(),
            blocks_annotated,
            total_blocks,
            func_max_count,
            outcome,
            summary,
        })
    }

    /// Match the statements of one block against the sample index
    pub fn annotate_block(&self, function: &Function, block: BlockId) -> Result<BlockSamples> {
        let bb = function.cfg.block(block)?;
        let mut samples = BlockSamples::default();

        for stmt in &bb.statements {
            let Some(location) = stmt.location.as_ref() else {
                continue;
            };
            samples.num_ir += 1;

            let stack = match inline_stack(function, stmt) {
                Ok(stack) => stack,
                Err(error @ Error::Overflow { .. }) => {
                    log::warn!(
                        "Ignoring statement at {} in {}: {}",
                        location,
                        function.name,
                        error
                    );
                    continue;
                }
                Err(error) => return Err(error),
            };

            let matched = if stack.is_empty() {
                self.store
                    .lookup_flat(&location.file, &function.assembler_name, location.line)
            } else {
                self.store.lookup_inline(
                    &stack,
                    &location.file,
                    &function.assembler_name,
                    location.line,
                )
            };

            if let Some(sample) = matched {
                if samples.record(sample) {
                    log::trace!(
                        "BB{}: {} line_{} ({})",
                        bb.index,
                        location.file,
                        location.line,
                        sample.count.freq
                    );
                }
            }
        }
        Ok(samples)
    }

    /// Total samples recorded for the inline instantiation `stmt` belongs to,
    /// where `callee` is the name of the inlined function
    pub fn inline_total_count(&self, function: &Function, stmt: &Statement, callee: &str) -> Result<u64> {
        let Some(location) = stmt.location.as_ref() else {
            return Ok(0);
        };
        let stack = callsite_stack(function, stmt)?;
        Ok(self.store.callsite_total(&stack, &location.file, callee))
    }

    /// Whether the sampled blocks of a function are enough to trust its profile
    pub fn is_usable(blocks_annotated: usize, total_blocks: usize) -> bool {
        blocks_annotated > 1 || (blocks_annotated == 1 && total_blocks < MIN_SAMPLE_BB_COUNT)
    }

    fn reset_counts(function: &mut Function) -> Result<()> {
        for block in function.cfg.blocks() {
            function.cfg.block_mut(block)?.count = 0;
        }
        Ok(())
    }
}
