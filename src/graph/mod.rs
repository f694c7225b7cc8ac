//! Execution graph: nodes, bounded edges, and timed segments
//!
//! The compiler lowers a parsed program into this arena-style graph.
//! Nodes, edges, and segments live in flat vectors and refer to each other
//! exclusively by integer id, so the runtime never deals with shared
//! ownership between graph entities.

pub mod compile;

use crate::lang::Params;
use std::fmt;
use std::time::Duration;

pub use compile::{CompileError, Compiler, compile_program};

/// Unique identifier for a node in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Unique identifier for an edge in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeId(usize);

impl EdgeId {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// Unique identifier for a timed segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(usize);

impl SegmentId {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// Node role, by input/output arity: sources generate (0 -> n),
/// processors transform (m -> n), sinks consume (m -> 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Source,
    Processor,
    Sink,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Source => write!(f, "source"),
            NodeKind::Processor => write!(f, "processor"),
            NodeKind::Sink => write!(f, "sink"),
        }
    }
}

/// One execution node: a registered function invocation with its bound
/// parameters and channel endpoints.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: NodeId,
    /// Display name, unique within the graph (e.g. `blur_3`)
    pub name: String,
    /// Registry key of the transform to run
    pub function: String,
    pub kind: NodeKind,
    pub params: Params,
    pub inputs: Vec<EdgeId>,
    pub outputs: Vec<EdgeId>,
    /// The innermost timed segment this node belongs to, if any
    pub segment: Option<SegmentId>,
}

/// A bounded channel between exactly one producer and one consumer.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub producer: NodeId,
    pub consumer: NodeId,
    pub capacity: usize,
}

/// A set of nodes sharing a wall-clock deadline (or, for an implicit
/// segment, just a temporal-sequencing boundary).
#[derive(Debug, Clone)]
pub struct Segment {
    pub id: SegmentId,
    pub deadline: Option<Duration>,
    pub members: Vec<NodeId>,
    /// Segments that must fully stop before this one's sources start
    pub after: Vec<SegmentId>,
}

/// The compiled execution graph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    segments: Vec<Segment>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_node(&mut self, function: &str, kind: NodeKind, params: Params) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(GraphNode {
            id,
            name: format!("{}_{}", function, id.0),
            function: function.to_string(),
            kind,
            params,
            inputs: Vec::new(),
            outputs: Vec::new(),
            segment: None,
        });
        id
    }

    pub(crate) fn add_edge(&mut self, producer: NodeId, consumer: NodeId, capacity: usize) -> EdgeId {
        let id = EdgeId(self.edges.len());
        self.edges.push(GraphEdge {
            id,
            producer,
            consumer,
            capacity,
        });
        self.nodes[producer.0].outputs.push(id);
        self.nodes[consumer.0].inputs.push(id);
        id
    }

    pub(crate) fn add_segment(&mut self, deadline: Option<Duration>) -> SegmentId {
        let id = SegmentId(self.segments.len());
        self.segments.push(Segment {
            id,
            deadline,
            members: Vec::new(),
            after: Vec::new(),
        });
        id
    }

    pub(crate) fn assign_segment(&mut self, node: NodeId, segment: SegmentId) {
        self.nodes[node.0].segment = Some(segment);
        self.segments[segment.0].members.push(node);
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &GraphEdge {
        &self.edges[id.0]
    }

    pub fn segment(&self, id: SegmentId) -> &Segment {
        &self.segments[id.0]
    }

    pub(crate) fn segment_mut(&mut self, id: SegmentId) -> &mut Segment {
        &mut self.segments[id.0]
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Entry sources: every source node in the graph.
    pub fn sources(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Source)
    }

    /// Terminal sinks: every sink node in the graph.
    pub fn sinks(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Sink)
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "graph: {} nodes, {} edges, {} segments",
            self.nodes.len(),
            self.edges.len(),
            self.segments.len()
        )?;
        for node in &self.nodes {
            write!(f, "  {} {} [{}]", node.id, node.name, node.kind)?;
            if let Some(seg) = node.segment {
                write!(f, " seg{}", seg.as_usize())?;
            }
            if !node.params.is_empty() {
                let params: Vec<String> = node
                    .params
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect();
                write!(f, " ({})", params.join(", "))?;
            }
            writeln!(f)?;
        }
        for edge in &self.edges {
            writeln!(
                f,
                "  {} -> {} cap={}",
                self.node(edge.producer).name,
                self.node(edge.consumer).name,
                edge.capacity
            )?;
        }
        for seg in &self.segments {
            write!(f, "  seg{}", seg.id.as_usize())?;
            match seg.deadline {
                Some(d) => write!(f, " deadline={:?}", d)?,
                None => write!(f, " untimed")?,
            }
            if !seg.after.is_empty() {
                let after: Vec<String> = seg
                    .after
                    .iter()
                    .map(|s| format!("seg{}", s.as_usize()))
                    .collect();
                write!(f, " after {}", after.join(", "))?;
            }
            writeln!(f, " members={}", seg.members.len())?;
        }
        Ok(())
    }
}
