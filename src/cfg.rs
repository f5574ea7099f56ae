//! Minimal host-side control-flow graph.
//!
//! The annotator only reads statement locations and lexical scopes and only
//! writes block counts, edge counts and branch probabilities; everything
//! else about the host IR stays outside this crate.

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use strum_macros::{AsRefStr, Display};

use crate::error::{Error, Result};
use crate::model::{ProfileSummary, SourceLocation};

/// Identifier of a basic block in the graph
pub type BlockId = NodeIndex;

/// Identifier of an edge in the graph
pub type EdgeId = EdgeIndex;

/// Index of a lexical scope within a function
pub type ScopeId = usize;

/// A lexical scope; inlined call bodies appear as nested scopes whose
/// location is the call site
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexicalScope {
    pub parent: Option<ScopeId>,
    pub location: Option<SourceLocation>,
}

/// An IR statement; only its location and scope matter here
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statement {
    pub location: Option<SourceLocation>,
    pub scope: Option<ScopeId>,
}

impl Statement {
    pub fn new(location: SourceLocation, scope: Option<ScopeId>) -> Self {
        Self {
            location: Some(location),
            scope,
        }
    }

    /// Statement without a source location, ignored during annotation
    pub fn artificial() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum BlockKind {
    Entry,
    Exit,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Stable block number; entry is 0, exit is 1
    pub index: usize,
    pub kind: BlockKind,
    pub statements: Vec<Statement>,
    /// Execution count estimate
    pub count: u64,
    /// Relative frequency, scaled to [`crate::smoothing::BB_FREQ_MAX`]
    pub frequency: u32,
    /// Largest single sample frequency matched in this block
    pub max_sample: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowEdge {
    /// Branch probability scaled to [`crate::smoothing::REG_BR_PROB_BASE`]
    pub probability: u32,
    pub count: u64,
    /// Temporary edge added for flow smoothing
    pub fake: bool,
}

/// Control-flow graph of one function
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    graph: StableDiGraph<BasicBlock, FlowEdge>,
    entry: BlockId,
    exit: BlockId,
    next_index: usize,
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlFlowGraph {
    /// Create a graph holding only the entry and exit blocks
    pub fn new() -> Self {
        let mut graph = StableDiGraph::new();
        let entry = graph.add_node(Self::empty_block(0, BlockKind::Entry));
        let exit = graph.add_node(Self::empty_block(1, BlockKind::Exit));
        Self {
            graph,
            entry,
            exit,
            next_index: 2,
        }
    }

    fn empty_block(index: usize, kind: BlockKind) -> BasicBlock {
        BasicBlock {
            index,
            kind,
            statements: Vec::new(),
            count: 0,
            frequency: 0,
            max_sample: 0,
        }
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn exit(&self) -> BlockId {
        self.exit
    }

    /// Add a normal block with the given statements
    pub fn add_block(&mut self, statements: Vec<Statement>) -> BlockId {
        let mut block = Self::empty_block(self.next_index, BlockKind::Normal);
        block.statements = statements;
        self.next_index += 1;
        self.graph.add_node(block)
    }

    /// Add an edge with a branch probability
    pub fn add_edge(&mut self, src: BlockId, dst: BlockId, probability: u32) -> EdgeId {
        self.graph.add_edge(
            src,
            dst,
            FlowEdge {
                probability,
                count: 0,
                fake: false,
            },
        )
    }

    pub(crate) fn add_fake_edge(&mut self, src: BlockId, dst: BlockId, probability: u32) -> EdgeId {
        self.graph.add_edge(
            src,
            dst,
            FlowEdge {
                probability,
                count: 0,
                fake: true,
            },
        )
    }

    pub(crate) fn remove_edge(&mut self, edge: EdgeId) -> Option<FlowEdge> {
        self.graph.remove_edge(edge)
    }

    /// Number of blocks including entry and exit
    pub fn n_basic_blocks(&self) -> usize {
        self.graph.node_count()
    }

    pub fn n_edges(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn block(&self, id: BlockId) -> Result<&BasicBlock> {
        self.graph
            .node_weight(id)
            .ok_or_else(|| Error::InvalidGraph(format!("unknown block {:?}", id)))
    }

    pub fn block_mut(&mut self, id: BlockId) -> Result<&mut BasicBlock> {
        self.graph
            .node_weight_mut(id)
            .ok_or_else(|| Error::InvalidGraph(format!("unknown block {:?}", id)))
    }

    pub fn edge(&self, id: EdgeId) -> Option<&FlowEdge> {
        self.graph.edge_weight(id)
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut FlowEdge> {
        self.graph.edge_weight_mut(id)
    }

    pub fn edge_endpoints(&self, id: EdgeId) -> Option<(BlockId, BlockId)> {
        self.graph.edge_endpoints(id)
    }

    /// All blocks, entry and exit included, ordered by block number
    pub fn all_blocks(&self) -> Vec<BlockId> {
        let mut blocks: Vec<BlockId> = self.graph.node_indices().collect();
        blocks.sort_by_key(|&id| self.graph[id].index);
        blocks
    }

    /// Normal blocks ordered by block number
    pub fn blocks(&self) -> Vec<BlockId> {
        self.all_blocks()
            .into_iter()
            .filter(|&id| self.graph[id].kind == BlockKind::Normal)
            .collect()
    }

    /// Outgoing edges in insertion order
    pub fn successors(&self, block: BlockId) -> Vec<EdgeId> {
        self.sorted_edges(block, Direction::Outgoing)
    }

    /// Incoming edges in insertion order
    pub fn predecessors(&self, block: BlockId) -> Vec<EdgeId> {
        self.sorted_edges(block, Direction::Incoming)
    }

    fn sorted_edges(&self, block: BlockId, direction: Direction) -> Vec<EdgeId> {
        let mut edges: Vec<EdgeId> = self
            .graph
            .edges_directed(block, direction)
            .map(|edge| edge.id())
            .collect();
        edges.sort();
        edges
    }

    /// Every edge in insertion order
    pub fn edges(&self) -> Vec<EdgeId> {
        let mut edges: Vec<EdgeId> = self.graph.edge_indices().collect();
        edges.sort();
        edges
    }

    /// Whether any block or edge carries a nonzero count
    pub fn has_counts(&self) -> bool {
        self.graph.node_weights().any(|block| block.count != 0)
            || self.graph.edge_weights().any(|edge| edge.count != 0)
    }
}

/// Where a function's execution counts came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, AsRefStr)]
pub enum ProfileStatus {
    /// No profile; only static estimates, if any
    #[default]
    Absent,
    /// Counts read from a profile
    Read,
}

/// A compiled function as seen by the annotator
#[derive(Debug, Clone)]
pub struct Function {
    /// Printable name used in dumps
    pub name: String,
    /// Symbol name matched against the profile
    pub assembler_name: String,
    pub cfg: ControlFlowGraph,
    pub scopes: Vec<LexicalScope>,
    pub profile_status: ProfileStatus,
    /// Set once the function has gone through a profiling pass
    pub after_profile: bool,
    /// Summary published when the function was annotated from samples
    pub profile_summary: Option<ProfileSummary>,
}

impl Function {
    pub fn new(name: impl Into<String>, assembler_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assembler_name: assembler_name.into(),
            cfg: ControlFlowGraph::new(),
            scopes: Vec::new(),
            profile_status: ProfileStatus::Absent,
            after_profile: false,
            profile_summary: None,
        }
    }

    /// Add a lexical scope nested in `parent`
    pub fn add_scope(&mut self, parent: Option<ScopeId>, location: Option<SourceLocation>) -> ScopeId {
        self.scopes.push(LexicalScope { parent, location });
        self.scopes.len() - 1
    }

    pub fn scope(&self, id: ScopeId) -> Result<&LexicalScope> {
        self.scopes
            .get(id)
            .ok_or_else(|| Error::InvalidGraph(format!("unknown lexical scope {}", id)))
    }
}
