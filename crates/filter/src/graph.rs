//! The user-editable filter graph and the chains extracted from it.

use std::collections::{BTreeMap, HashMap};

use smallvec::SmallVec;
use tracing::warn;

use scanline_core::prelude::Resolution;

use crate::catalogue::{FilterKind, PARAM_BLOB_LEN, gate, read_u16};
use crate::ops::{self, OpContext};

/// Stable node identifier within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

/// One node of the filter graph: a filter instance plus its outgoing edges
/// and its display position in the editor.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub id: NodeId,
    pub kind: FilterKind,
    pub params: [u8; PARAM_BLOB_LEN],
    pub edges: SmallVec<[NodeId; 2]>,
    pub position: (f32, f32),
}

/// A linear run of filters from an input gate through an output gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChain {
    pub nodes: Vec<NodeId>,
}

/// Outcome of a chain rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainBuildReport {
    /// Chains now available for frame processing.
    pub chains: usize,
    /// Traversal branches abandoned because they looped.
    pub cycles: usize,
}

/// Per-node operator state, owned by the processing side.
///
/// Keeping temporal state out of the graph lets the graph itself be
/// replaced wholesale without tearing down half-processed history, and a
/// replacement starts the operators fresh.
#[derive(Default)]
pub struct GraphRuntime {
    contexts: HashMap<NodeId, OpContext>,
}

impl GraphRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for the given node, created on first use.
    pub fn context(&mut self, id: NodeId) -> &mut OpContext {
        self.contexts.entry(id).or_default()
    }

    /// Drop all operator state; used when the graph is replaced.
    pub fn clear(&mut self) {
        self.contexts.clear();
    }
}

/// Directed graph of filter nodes with cached chains.
///
/// Zero or more input gates feed zero or more output gates; a node's single
/// output socket may fan out to several targets, and fan-in is allowed.
/// Chains are re-extracted explicitly via [`rebuild_chains`](Self::rebuild_chains)
/// after edits.
///
/// # Example
/// ```rust
/// use scanline_filter::prelude::*;
///
/// let mut graph = FilterGraph::new();
/// let input = graph.add_node(FilterKind::InputGate);
/// let blur = graph.add_node(FilterKind::Blur);
/// let output = graph.add_node(FilterKind::OutputGate);
/// graph.connect(input, blur);
/// graph.connect(blur, output);
/// let report = graph.rebuild_chains();
/// assert_eq!(report.chains, 1);
/// assert_eq!(report.cycles, 0);
/// ```
#[derive(Default)]
pub struct FilterGraph {
    nodes: BTreeMap<NodeId, FilterNode>,
    chains: Vec<FilterChain>,
    enabled: bool,
    next_id: u32,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether frames are run through the graph at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add a node of the given kind with default parameters.
    pub fn add_node(&mut self, kind: FilterKind) -> NodeId {
        self.add_node_at(kind, kind.default_params(), (0.0, 0.0))
    }

    /// Add a node with explicit parameters and display position.
    pub fn add_node_at(
        &mut self,
        kind: FilterKind,
        params: [u8; PARAM_BLOB_LEN],
        position: (f32, f32),
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            FilterNode {
                id,
                kind,
                params,
                edges: SmallVec::new(),
                position,
            },
        );
        id
    }

    /// Insert a fully-formed node, keeping its id (used when loading a
    /// saved graph). A colliding id replaces the existing node.
    pub fn insert_node(&mut self, node: FilterNode) {
        self.next_id = self.next_id.max(node.id.0 + 1);
        self.nodes.insert(node.id, node);
    }

    pub fn node(&self, id: NodeId) -> Option<&FilterNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut FilterNode> {
        self.nodes.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FilterNode> {
        self.nodes.values()
    }

    /// Connect `from`'s output socket to `to`. Returns false if either node
    /// is missing; duplicate edges are ignored.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> bool {
        if !self.nodes.contains_key(&to) {
            return false;
        }
        let Some(node) = self.nodes.get_mut(&from) else {
            return false;
        };
        if !node.edges.contains(&to) {
            node.edges.push(to);
        }
        true
    }

    pub fn disconnect(&mut self, from: NodeId, to: NodeId) {
        if let Some(node) = self.nodes.get_mut(&from) {
            node.edges.retain(|id| *id != to);
        }
    }

    /// Remove a node and every edge pointing at it.
    pub fn remove_node(&mut self, id: NodeId) {
        self.nodes.remove(&id);
        for node in self.nodes.values_mut() {
            node.edges.retain(|edge| *edge != id);
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.chains.clear();
        self.next_id = 0;
    }

    /// Re-extract the chain list from the graph.
    ///
    /// Every input gate starts a depth-first walk; reaching an output gate
    /// emits the accumulated chain, and a branch that revisits a node in
    /// its own accumulator is abandoned as a cycle. Other branches and
    /// other gates are unaffected by a cycle.
    pub fn rebuild_chains(&mut self) -> ChainBuildReport {
        let mut chains = Vec::new();
        let mut cycles = 0usize;

        let input_gates: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.kind == FilterKind::InputGate)
            .map(|n| n.id)
            .collect();
        for gate_id in input_gates {
            self.walk(gate_id, Vec::new(), &mut chains, &mut cycles);
        }

        if cycles > 0 {
            warn!(cycles, "filter graph contains looping chains; they stay unusable until disconnected");
        }
        self.chains = chains;
        ChainBuildReport {
            chains: self.chains.len(),
            cycles,
        }
    }

    fn walk(
        &self,
        id: NodeId,
        mut acc: Vec<NodeId>,
        chains: &mut Vec<FilterChain>,
        cycles: &mut usize,
    ) {
        if acc.contains(&id) {
            *cycles += 1;
            return;
        }
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        acc.push(id);
        if node.kind == FilterKind::OutputGate {
            chains.push(FilterChain { nodes: acc });
            return;
        }
        for &next in &node.edges {
            self.walk(next, acc.clone(), chains, cycles);
        }
    }

    /// The current flat chain list.
    pub fn chains(&self) -> &[FilterChain] {
        &self.chains
    }

    /// Check the graph for looping chains without rebuilding anything.
    /// Returns the first node at which a loop closes.
    pub fn validate(&self) -> Result<(), crate::GraphError> {
        fn visit(
            graph: &FilterGraph,
            id: NodeId,
            trail: &mut Vec<NodeId>,
        ) -> Result<(), crate::GraphError> {
            if trail.contains(&id) {
                return Err(crate::GraphError::CycleDetected(id.0));
            }
            let Some(node) = graph.nodes.get(&id) else {
                return Ok(());
            };
            if node.kind == FilterKind::OutputGate {
                return Ok(());
            }
            trail.push(id);
            for &next in &node.edges {
                visit(graph, next, trail)?;
            }
            trail.pop();
            Ok(())
        }

        let mut trail = Vec::new();
        for node in self.nodes.values() {
            if node.kind == FilterKind::InputGate {
                visit(self, node.id, &mut trail)?;
            }
        }
        Ok(())
    }

    /// Pick the chain for a frame of `capture` resolution heading for
    /// `output` resolution: an input+output gate match beats an input-gate
    /// match; a gate dimension of zero is a wildcard for that axis.
    pub fn chain_for(&self, capture: Resolution, output: Resolution) -> Option<&FilterChain> {
        self.chains
            .iter()
            .find(|chain| {
                self.gate_matches(chain.nodes.first(), capture)
                    && self.gate_matches(chain.nodes.last(), output)
            })
            .or_else(|| {
                self.chains
                    .iter()
                    .find(|chain| self.gate_matches(chain.nodes.first(), capture))
            })
    }

    fn gate_matches(&self, id: Option<&NodeId>, res: Resolution) -> bool {
        let Some(node) = id.and_then(|id| self.nodes.get(id)) else {
            return false;
        };
        let w = read_u16(&node.params, gate::WIDTH);
        let h = read_u16(&node.params, gate::HEIGHT);
        (w == 0 || u32::from(w) == res.w) && (h == 0 || u32::from(h) == res.h)
    }

    /// Run the selected chain over a BGRA frame in place. Returns whether a
    /// chain applied. A disabled graph is a bypass.
    pub fn apply(
        &self,
        runtime: &mut GraphRuntime,
        px: &mut [u8],
        res: Resolution,
        output: Resolution,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(chain) = self.chain_for(res, output) else {
            return false;
        };
        for id in &chain.nodes {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if node.kind.is_gate() {
                continue;
            }
            ops::apply(node.kind, &node.params, runtime.context(*id), px, res);
        }
        true
    }
}
