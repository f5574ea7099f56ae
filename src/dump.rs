//! Textual per-edge profile dump consumed by external comparison tooling.
//!
//! Each function appends one section:
//!
//! ```text
//! ;;<n_basic_blocks> <n_edges> <entry count> <function name>
//! <src> <dst> <pw> <probability> <count>
//! ```
//!
//! `pw` is the edge's share of the summed edge frequencies of the function.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use strum_macros::{AsRefStr, Display, EnumIter};

use crate::cfg::Function;
use crate::error::{Error, Result};
use crate::smoothing::REG_BR_PROB_BASE;

/// Which profile the dump describes; selects the output file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumIter)]
pub enum DumpKind {
    #[strum(serialize = "prof.compare.sample")]
    Sample,
    #[strum(serialize = "prof.compare.branch")]
    Branch,
}

impl DumpKind {
    pub fn file_name(&self) -> &str {
        self.as_ref()
    }
}

fn edge_frequency(src_frequency: u32, probability: u32) -> u64 {
    u64::from(src_frequency) * u64::from(probability) / u64::from(REG_BR_PROB_BASE)
}

/// Write the dump section of one function
pub fn write_cfg_profile<W: Write>(out: &mut W, function: &Function) -> Result<()> {
    let cfg = &function.cfg;
    let entry = cfg.block(cfg.entry())?;
    writeln!(
        out,
        ";;{} {} {} {}",
        cfg.n_basic_blocks(),
        cfg.n_edges(),
        entry.count,
        function.name
    )?;

    let mut rows = Vec::new();
    let mut sum_edge_freq = 0u64;
    for block in cfg.all_blocks() {
        let src = cfg.block(block)?;
        for edge_id in cfg.successors(block) {
            let (Some(edge), Some((_, dst))) = (cfg.edge(edge_id), cfg.edge_endpoints(edge_id)) else {
                continue;
            };
            let efreq = edge_frequency(src.frequency, edge.probability);
            sum_edge_freq += efreq;
            rows.push((src.index, cfg.block(dst)?.index, efreq, edge.probability, edge.count));
        }
    }

    for (src, dst, efreq, probability, count) in rows {
        if sum_edge_freq > 0 {
            writeln!(
                out,
                "{} {} {:.6} {} {}",
                src,
                dst,
                efreq as f32 / sum_edge_freq as f32,
                probability,
                count
            )?;
        } else {
            writeln!(out, "{} {} 0.0 {} {}", src, dst, probability, count)?;
        }
    }
    Ok(())
}

/// Append the dump section of one function to `path`
pub fn dump_cfg_profile(path: &Path, function: &Function) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::DumpError(path.to_path_buf(), e.to_string()))?;

    let mut section = Vec::new();
    write_cfg_profile(&mut section, function)?;
    file.write_all(&section)
        .map_err(|e| Error::DumpError(path.to_path_buf(), e.to_string()))
}
