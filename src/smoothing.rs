//! Seams to the flow-consistency stage and to static branch estimation.
//!
//! The min-cost-flow solver belongs to the host. This module defines the
//! traits the annotator calls and the graph bookkeeping that surrounds the
//! solver: deriving edge counts from block counts, adding and removing the
//! fake exit edges, and turning counts back into frequencies.

use crate::cfg::{BlockId, ControlFlowGraph};
use crate::error::Result;

/// Probability scale of branch probabilities
pub const REG_BR_PROB_BASE: u32 = 10000;

/// Scale of relative block frequencies
pub const BB_FREQ_MAX: u32 = 10000;

/// Flow-consistency stage run on a successfully annotated graph.
///
/// The call is atomic for the annotator: either the graph comes back
/// corrected or it is left untouched.
pub trait FlowSmoother: Send + Sync {
    fn name(&self) -> &str;

    fn smooth(&self, cfg: &mut ControlFlowGraph) -> Result<()>;
}

/// Static branch-probability heuristics used before any counts exist
pub trait ProbabilityEstimator: Send + Sync {
    fn estimate(&self, cfg: &mut ControlFlowGraph) -> Result<()>;
}

/// Splits each block's probability evenly across its successors
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformProbabilityEstimator;

impl ProbabilityEstimator for UniformProbabilityEstimator {
    fn estimate(&self, cfg: &mut ControlFlowGraph) -> Result<()> {
        for block in cfg.all_blocks() {
            let succs = cfg.successors(block);
            if succs.is_empty() {
                continue;
            }
            let share = REG_BR_PROB_BASE / succs.len() as u32;
            let remainder = REG_BR_PROB_BASE - share * succs.len() as u32;
            for (i, edge) in succs.into_iter().enumerate() {
                if let Some(edge) = cfg.edge_mut(edge) {
                    edge.probability = if i == 0 { share + remainder } else { share };
                }
            }
        }
        Ok(())
    }
}

/// Runs the bookkeeping around flow smoothing without a min-cost-flow step.
///
/// Hosts with a solver implement [`FlowSmoother`] themselves and call the
/// helpers in this module around it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeDerivationSmoother;

impl FlowSmoother for EdgeDerivationSmoother {
    fn name(&self) -> &str {
        "edge-derivation"
    }

    fn smooth(&self, cfg: &mut ControlFlowGraph) -> Result<()> {
        init_edge_counts(cfg)?;
        let fake = add_noreturn_fake_exit_edges(cfg)?;
        log::trace!("added {} fake exit edges", fake);
        remove_fake_exit_edges(cfg);
        probabilities_from_counts(cfg)?;
        counts_to_freqs(cfg)?;
        Ok(())
    }
}

/// `count * probability / REG_BR_PROB_BASE`; probabilities above the base are clamped
fn scaled(count: u64, probability: u32) -> u64 {
    let probability = probability.min(REG_BR_PROB_BASE);
    let scaled = u128::from(count) * u128::from(probability) / u128::from(REG_BR_PROB_BASE);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// Derive edge counts from block counts and branch probabilities.
///
/// Each normal block's count becomes the sum of its outgoing edge counts;
/// entry and exit counts are rebuilt from their edges.
pub fn init_edge_counts(cfg: &mut ControlFlowGraph) -> Result<()> {
    let blocks = cfg.blocks();
    for &block in &blocks {
        let count = cfg.block(block)?.count;
        let mut outgoing = 0u64;
        for edge in cfg.successors(block) {
            if let Some(edge) = cfg.edge_mut(edge) {
                edge.count = scaled(count, edge.probability);
                outgoing = outgoing.saturating_add(edge.count);
            }
        }
        if !cfg.successors(block).is_empty() {
            cfg.block_mut(block)?.count = outgoing;
        }
    }

    let entry = cfg.entry();
    let mut entry_count = 0u64;
    for edge in cfg.successors(entry) {
        let dest_count = match cfg.edge_endpoints(edge) {
            Some((_, dst)) => cfg.block(dst)?.count,
            None => continue,
        };
        if let Some(edge) = cfg.edge_mut(edge) {
            edge.count = dest_count;
        }
        entry_count = entry_count.saturating_add(dest_count);
    }
    cfg.block_mut(entry)?.count = entry_count;

    let exit = cfg.exit();
    let exit_count = cfg
        .predecessors(exit)
        .into_iter()
        .filter_map(|edge| cfg.edge(edge).map(|edge| edge.count))
        .fold(0u64, u64::saturating_add);
    cfg.block_mut(exit)?.count = exit_count;
    Ok(())
}

/// Connect every normal block without successors to the exit block.
///
/// Returns the number of fake edges added.
pub fn add_noreturn_fake_exit_edges(cfg: &mut ControlFlowGraph) -> Result<usize> {
    let exit = cfg.exit();
    let dead_ends: Vec<BlockId> = cfg
        .blocks()
        .into_iter()
        .filter(|&block| cfg.successors(block).is_empty())
        .collect();

    for &block in &dead_ends {
        let count = cfg.block(block)?.count;
        let edge = cfg.add_fake_edge(block, exit, REG_BR_PROB_BASE);
        if let Some(edge) = cfg.edge_mut(edge) {
            edge.count = count;
        }
    }
    Ok(dead_ends.len())
}

/// Remove the edges added by [`add_noreturn_fake_exit_edges`]
pub fn remove_fake_exit_edges(cfg: &mut ControlFlowGraph) -> usize {
    let fake: Vec<_> = cfg
        .edges()
        .into_iter()
        .filter(|&edge| cfg.edge(edge).map(|edge| edge.fake).unwrap_or(false))
        .collect();
    for &edge in &fake {
        cfg.remove_edge(edge);
    }
    fake.len()
}

/// Recompute branch probabilities of blocks with a nonzero count from edge counts
pub fn probabilities_from_counts(cfg: &mut ControlFlowGraph) -> Result<()> {
    for block in cfg.all_blocks() {
        let count = cfg.block(block)?.count;
        if count == 0 {
            continue;
        }
        for edge in cfg.successors(block) {
            if let Some(edge) = cfg.edge_mut(edge) {
                let probability =
                    (u128::from(edge.count) * u128::from(REG_BR_PROB_BASE)) / u128::from(count);
                edge.probability = probability.min(u128::from(REG_BR_PROB_BASE)) as u32;
            }
        }
    }
    Ok(())
}

/// Scale block counts into relative frequencies in `0..=BB_FREQ_MAX`
pub fn counts_to_freqs(cfg: &mut ControlFlowGraph) -> Result<()> {
    let blocks = cfg.all_blocks();
    let mut count_max = 1u64;
    for &block in &blocks {
        count_max = count_max.max(cfg.block(block)?.count);
    }

    for &block in &blocks {
        let block = cfg.block_mut(block)?;
        let scaled = (u128::from(block.count) * u128::from(BB_FREQ_MAX) + u128::from(count_max / 2))
            / u128::from(count_max);
        block.frequency = scaled as u32;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Statement;

    fn diamond() -> (ControlFlowGraph, [BlockId; 4]) {
        let mut cfg = ControlFlowGraph::new();
        let a = cfg.add_block(vec![Statement::artificial()]);
        let b = cfg.add_block(Vec::new());
        let c = cfg.add_block(Vec::new());
        let d = cfg.add_block(Vec::new());
        let (entry, exit) = (cfg.entry(), cfg.exit());
        cfg.add_edge(entry, a, REG_BR_PROB_BASE);
        cfg.add_edge(a, b, 0);
        cfg.add_edge(a, c, 0);
        cfg.add_edge(b, d, REG_BR_PROB_BASE);
        cfg.add_edge(c, d, REG_BR_PROB_BASE);
        cfg.add_edge(d, exit, REG_BR_PROB_BASE);
        (cfg, [a, b, c, d])
    }

    #[test]
    fn test_uniform_estimator_splits_probability() {
        let (mut cfg, [a, ..]) = diamond();
        UniformProbabilityEstimator.estimate(&mut cfg).unwrap();
        let probs: Vec<u32> = cfg
            .successors(a)
            .into_iter()
            .map(|edge| cfg.edge(edge).unwrap().probability)
            .collect();
        assert_eq!(probs, vec![5000, 5000]);
    }

    #[test]
    fn test_init_edge_counts() {
        let (mut cfg, [a, b, c, d]) = diamond();
        UniformProbabilityEstimator.estimate(&mut cfg).unwrap();
        cfg.block_mut(a).unwrap().count = 100;
        cfg.block_mut(b).unwrap().count = 70;
        cfg.block_mut(c).unwrap().count = 30;
        cfg.block_mut(d).unwrap().count = 100;

        init_edge_counts(&mut cfg).unwrap();
        assert_eq!(cfg.block(cfg.entry()).unwrap().count, 100);
        assert_eq!(cfg.block(cfg.exit()).unwrap().count, 100);
        let counts: Vec<u64> = cfg
            .successors(a)
            .into_iter()
            .map(|edge| cfg.edge(edge).unwrap().count)
            .collect();
        assert_eq!(counts, vec![50, 50]);
    }

    #[test]
    fn test_edge_counts_saturate() {
        let mut cfg = ControlFlowGraph::new();
        let a = cfg.add_block(Vec::new());
        let b = cfg.add_block(Vec::new());
        let (entry, exit) = (cfg.entry(), cfg.exit());
        cfg.add_edge(entry, a, 5000);
        cfg.add_edge(entry, b, 5000);
        cfg.add_edge(a, exit, REG_BR_PROB_BASE);
        cfg.add_edge(b, exit, REG_BR_PROB_BASE);
        cfg.block_mut(a).unwrap().count = u64::MAX;
        cfg.block_mut(b).unwrap().count = u64::MAX;

        init_edge_counts(&mut cfg).unwrap();
        assert_eq!(cfg.block(entry).unwrap().count, u64::MAX);
        assert_eq!(cfg.block(exit).unwrap().count, u64::MAX);
    }

    #[test]
    fn test_probability_above_base_is_clamped() {
        let mut cfg = ControlFlowGraph::new();
        let a = cfg.add_block(Vec::new());
        let (entry, exit) = (cfg.entry(), cfg.exit());
        cfg.add_edge(entry, a, REG_BR_PROB_BASE);
        let out = cfg.add_edge(a, exit, 3 * REG_BR_PROB_BASE);
        cfg.block_mut(a).unwrap().count = u64::MAX;

        init_edge_counts(&mut cfg).unwrap();
        assert_eq!(cfg.edge(out).unwrap().count, u64::MAX);
        assert_eq!(cfg.block(a).unwrap().count, u64::MAX);
    }

    #[test]
    fn test_fake_exit_edges_round_trip() {
        let mut cfg = ControlFlowGraph::new();
        let a = cfg.add_block(Vec::new());
        let entry = cfg.entry();
        cfg.add_edge(entry, a, REG_BR_PROB_BASE);
        assert_eq!(add_noreturn_fake_exit_edges(&mut cfg).unwrap(), 1);
        assert_eq!(cfg.n_edges(), 2);
        assert_eq!(remove_fake_exit_edges(&mut cfg), 1);
        assert_eq!(cfg.n_edges(), 1);
    }

    #[test]
    fn test_counts_to_freqs_scales_to_max() {
        let (mut cfg, [a, b, ..]) = diamond();
        cfg.block_mut(a).unwrap().count = 200;
        cfg.block_mut(b).unwrap().count = 50;
        counts_to_freqs(&mut cfg).unwrap();
        assert_eq!(cfg.block(a).unwrap().frequency, BB_FREQ_MAX);
        assert_eq!(cfg.block(b).unwrap().frequency, 2500);
    }
}
