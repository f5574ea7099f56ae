#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::BufMut;

use sample_profile::smoothing::{FlowSmoother, ProbabilityEstimator, REG_BR_PROB_BASE};
use sample_profile::{ControlFlowGraph, Function, Result, SourceLocation, Statement};

/// Header entries carrying the trailing group total
pub const ENTRY_SIZE: u32 = 60;

/// Header entries without the group total
pub const PACKED_ENTRY_SIZE: u32 = 52;

#[derive(Debug, Clone, Copy)]
pub struct LineSample {
    pub line: u32,
    pub freq: u64,
    pub num_instr: u32,
}

pub fn line(line: u32, freq: u64, num_instr: u32) -> LineSample {
    LineSample { line, freq, num_instr }
}

/// One inline group; `stack` is listed innermost call site first
#[derive(Debug, Clone, Default)]
pub struct InlineGroupSpec {
    pub file: String,
    pub func: String,
    pub total_samples: u64,
    pub stack: Vec<(String, u32)>,
    pub lines: Vec<LineSample>,
    pub depth_override: Option<u32>,
}

impl InlineGroupSpec {
    pub fn new(file: &str, func: &str, total_samples: u64, stack: &[(&str, u32)], lines: Vec<LineSample>) -> Self {
        Self {
            file: file.to_string(),
            func: func.to_string(),
            total_samples,
            stack: stack.iter().map(|(f, l)| (f.to_string(), *l)).collect(),
            lines,
            depth_override: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FunctionSpec {
    pub file: String,
    pub func: String,
    pub lines: Vec<LineSample>,
    pub inline_groups: Vec<InlineGroupSpec>,
}

impl FunctionSpec {
    pub fn new(file: &str, func: &str, lines: Vec<LineSample>) -> Self {
        Self {
            file: file.to_string(),
            func: func.to_string(),
            lines,
            inline_groups: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: InlineGroupSpec) -> Self {
        self.inline_groups.push(group);
        self
    }
}

#[derive(Default)]
struct StringPool {
    bytes: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl StringPool {
    fn offset(&mut self, text: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(text) {
            return offset;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(text.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(text.to_string(), offset);
        offset
    }
}

struct Header {
    filename_offset: u32,
    func_name_offset: u32,
    total_samples: u64,
    num_freq: u64,
    freq_offset: u64,
    num_inline: u64,
    inline_hdr_offset: u64,
    depth: u32,
    stack_offset: u64,
}

fn put_line(out: &mut Vec<u8>, sample: &LineSample) {
    out.put_u32_le(sample.line);
    out.put_u64_le(sample.freq);
    out.put_u32_le(sample.num_instr);
}

fn put_header(out: &mut Vec<u8>, header: &Header, entry_size: usize) {
    let start = out.len();
    out.put_u32_le(header.filename_offset);
    out.put_u32_le(header.func_name_offset);
    out.put_u64_le(header.num_freq);
    out.put_u64_le(header.freq_offset);
    out.put_u64_le(header.num_inline);
    out.put_u64_le(header.inline_hdr_offset);
    out.put_u32_le(header.depth);
    out.put_u64_le(header.stack_offset);
    if entry_size >= ENTRY_SIZE as usize {
        out.put_u64_le(header.total_samples);
    }
    out.resize(start + entry_size, 0);
}

/// Writes synthetic profiles in the binary sample format
#[derive(Default)]
pub struct ProfileFileBuilder {
    pub functions: Vec<FunctionSpec>,
    pub entry_size: Option<u32>,
}

impl ProfileFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(mut self, spec: FunctionSpec) -> Self {
        self.functions.push(spec);
        self
    }

    pub fn entry_size(mut self, size: u32) -> Self {
        self.entry_size = Some(size);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let entry = self.entry_size.unwrap_or(ENTRY_SIZE) as usize;
        let mut pool = StringPool::default();
        let mut data = Vec::new();
        let mut func_headers = Vec::new();
        let mut inline_headers = Vec::new();

        for function in &self.functions {
            let freq_offset = data.len() as u64;
            for sample in &function.lines {
                put_line(&mut data, sample);
            }

            let inline_hdr_offset = (inline_headers.len() * entry) as u64;
            for group in &function.inline_groups {
                let stack_offset = data.len() as u64;
                for (file, line) in group.stack.iter().rev() {
                    let offset = pool.offset(file);
                    data.put_u32_le(offset);
                    data.put_u32_le(*line);
                }
                let group_freq_offset = data.len() as u64;
                for sample in &group.lines {
                    put_line(&mut data, sample);
                }
                inline_headers.push(Header {
                    filename_offset: pool.offset(&group.file),
                    func_name_offset: pool.offset(&group.func),
                    total_samples: group.total_samples,
                    num_freq: group.lines.len() as u64,
                    freq_offset: group_freq_offset,
                    num_inline: 0,
                    inline_hdr_offset: 0,
                    depth: group.depth_override.unwrap_or(group.stack.len() as u32),
                    stack_offset,
                });
            }

            func_headers.push(Header {
                filename_offset: pool.offset(&function.file),
                func_name_offset: pool.offset(&function.func),
                total_samples: function.lines.iter().map(|s| s.freq).sum(),
                num_freq: function.lines.len() as u64,
                freq_offset,
                num_inline: function.inline_groups.len() as u64,
                inline_hdr_offset,
                depth: 0,
                stack_offset: 0,
            });
        }

        let func_hdr_offset = 40u64;
        let str_table_offset =
            func_hdr_offset + ((func_headers.len() + inline_headers.len()) * entry) as u64;
        let profile_offset = str_table_offset + pool.bytes.len() as u64;

        let mut out = Vec::new();
        out.put_u64_le(str_table_offset);
        out.put_u64_le(pool.bytes.len() as u64);
        out.put_u64_le(func_hdr_offset);
        out.put_u32_le(func_headers.len() as u32);
        out.put_u32_le(entry as u32);
        out.put_u64_le(profile_offset);
        for header in func_headers.iter().chain(inline_headers.iter()) {
            put_header(&mut out, header, entry);
        }
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&data);
        out
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> anyhow::Result<PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, self.build())?;
        Ok(path)
    }
}

pub fn stmt(file: &str, line: u32) -> Statement {
    Statement::new(SourceLocation::new(file, line), None)
}

/// Function whose blocks form a chain from entry to exit
pub fn chain_function(name: &str, blocks: Vec<Vec<Statement>>) -> Function {
    let mut function = Function::new(name, name);
    let mut prev = function.cfg.entry();
    for statements in blocks {
        let block = function.cfg.add_block(statements);
        function.cfg.add_edge(prev, block, REG_BR_PROB_BASE);
        prev = block;
    }
    let exit = function.cfg.exit();
    function.cfg.add_edge(prev, exit, REG_BR_PROB_BASE);
    function
}

pub fn block_counts(cfg: &ControlFlowGraph) -> Vec<u64> {
    cfg.blocks()
        .into_iter()
        .map(|block| cfg.block(block).unwrap().count)
        .collect()
}

/// Smoother that records the raw counts it receives and leaves the graph alone
#[derive(Default)]
pub struct RecordingSmoother {
    pub seen: Mutex<Vec<Vec<u64>>>,
}

impl FlowSmoother for RecordingSmoother {
    fn name(&self) -> &str {
        "recording"
    }

    fn smooth(&self, cfg: &mut ControlFlowGraph) -> Result<()> {
        self.seen.lock().unwrap().push(block_counts(cfg));
        Ok(())
    }
}

/// Estimator that only counts how often it ran
#[derive(Default)]
pub struct CountingEstimator {
    pub calls: Mutex<usize>,
}

impl ProbabilityEstimator for CountingEstimator {
    fn estimate(&self, _cfg: &mut ControlFlowGraph) -> Result<()> {
        *self.calls.lock().unwrap() += 1;
        Ok(())
    }
}
