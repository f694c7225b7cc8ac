//! Compiler: lowers a parsed program into an execution graph
//!
//! Named pipelines are inlined at their call sites with cycle detection.
//! Sequential composition connects every terminal of the left fragment to
//! every entry of the right fragment; parallel branches share the next
//! sequential stage as their implicit merge consumer. A sequence whose
//! right side starts with sources carries no frames at all; it orders
//! timed segments in wall-clock time instead.

use super::{Graph, NodeId, NodeKind, SegmentId};
use crate::lang::{Expr, Program, Value};
use crate::runtime::registry::FunctionRegistry;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default capacity of a `->` edge, in frames.
pub const SYNC_EDGE_CAPACITY: usize = 10;
/// Default capacity of a `~>` edge, in frames.
pub const ASYNC_EDGE_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("unknown function or pipeline '{name}'")]
    UnknownName { name: String },

    #[error("pipeline definitions form a cycle: {chain}")]
    Cycle { chain: String },

    #[error("{detail}")]
    KindMismatch { detail: String },

    #[error("parallel branches have no downstream consumer")]
    DanglingParallel,

    #[error("pipeline has no source")]
    NoSource,

    #[error("pipeline has no sink")]
    NoSink,
}

/// The piece of graph produced by lowering one expression: its boundary
/// nodes plus everything emitted while lowering it.
struct Fragment {
    entries: Vec<NodeId>,
    exits: Vec<NodeId>,
    nodes: Vec<NodeId>,
    segments: Vec<SegmentId>,
}

impl Fragment {
    fn absorb(&mut self, other: Fragment) {
        self.nodes.extend(other.nodes);
        self.segments.extend(other.segments);
    }
}

pub struct Compiler<'r> {
    registry: &'r FunctionRegistry,
    sync_capacity: usize,
    async_capacity: usize,
    graph: Graph,
    definitions: Vec<(String, Expr)>,
    expanding: Vec<String>,
}

/// Compile a program against a registry with the default edge capacities.
pub fn compile_program(
    program: &Program,
    registry: &FunctionRegistry,
) -> Result<Graph, CompileError> {
    Compiler::new(registry).compile(program)
}

impl<'r> Compiler<'r> {
    pub fn new(registry: &'r FunctionRegistry) -> Self {
        Self {
            registry,
            sync_capacity: SYNC_EDGE_CAPACITY,
            async_capacity: ASYNC_EDGE_CAPACITY,
            graph: Graph::new(),
            definitions: Vec::new(),
            expanding: Vec::new(),
        }
    }

    /// Override the default capacities for `->` and `~>` edges.
    pub fn with_edge_capacities(mut self, sync: usize, async_: usize) -> Self {
        self.sync_capacity = sync.max(1);
        self.async_capacity = async_.max(1);
        self
    }

    pub fn compile(mut self, program: &Program) -> Result<Graph, CompileError> {
        self.definitions = program
            .definitions
            .iter()
            .map(|d| (d.name.clone(), d.body.clone()))
            .collect();

        // A program that is nothing but definitions has no executable tail.
        let body = program.body.as_ref().ok_or(CompileError::NoSource)?;

        if self.is_bare_par(body) {
            return Err(CompileError::DanglingParallel);
        }

        let fragment = self.lower(body)?;
        debug!(
            nodes = fragment.nodes.len(),
            edges = self.graph.edges().len(),
            segments = fragment.segments.len(),
            "lowered program"
        );

        self.validate()?;
        Ok(self.graph)
    }

    /// Latest definition wins when a name is bound more than once.
    fn resolve_def(&self, name: &str) -> Option<Expr> {
        self.definitions
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, body)| body.clone())
    }

    /// True when the executable expression is a parallel block with no
    /// sequential consumer anywhere above it, resolving through groups,
    /// timers, and pipeline references.
    fn is_bare_par(&self, body: &Expr) -> bool {
        fn walk(compiler: &Compiler<'_>, expr: &Expr, seen: &mut HashSet<String>) -> bool {
            match expr {
                Expr::Par { .. } => true,
                Expr::Group { inner } | Expr::Timed { inner, .. } => walk(compiler, inner, seen),
                Expr::Call { name, .. } => {
                    if !seen.insert(name.clone()) {
                        // Definition cycle; lowering reports it properly
                        return false;
                    }
                    match compiler.resolve_def(name) {
                        Some(def_body) => walk(compiler, &def_body, seen),
                        None => false,
                    }
                }
                Expr::Seq { .. } => false,
            }
        }
        walk(self, body, &mut HashSet::new())
    }

    fn lower(&mut self, expr: &Expr) -> Result<Fragment, CompileError> {
        match expr {
            Expr::Call { name, params } => self.lower_call(name, params),
            Expr::Seq { left, right, link } => self.lower_seq(left, right, *link),
            Expr::Par { branches } => self.lower_par(branches),
            Expr::Timed { inner, seconds } => self.lower_timed(inner, *seconds),
            Expr::Group { inner } => self.lower(inner),
        }
    }

    fn lower_call(
        &mut self,
        name: &str,
        params: &crate::lang::Params,
    ) -> Result<Fragment, CompileError> {
        if let Some(body) = self.resolve_def(name) {
            if self.expanding.iter().any(|n| n == name) {
                let mut chain = self.expanding.clone();
                chain.push(name.to_string());
                return Err(CompileError::Cycle {
                    chain: chain.join(" -> "),
                });
            }
            if !params.is_empty() {
                warn!(pipeline = name, "parameters on a pipeline reference are ignored");
            }
            self.expanding.push(name.to_string());
            let fragment = self.lower(&body)?;
            self.expanding.pop();
            return Ok(fragment);
        }

        let Some(spec) = self.registry.get(name) else {
            return Err(CompileError::UnknownName {
                name: name.to_string(),
            });
        };

        let mut merged = spec.defaults().clone();
        for (key, value) in params {
            if !spec.defaults().contains_key(key) && key != "buffer" && key != "window_name" {
                warn!(function = name, param = %key, "unknown parameter, forwarded as-is");
            }
            merged.insert(key.clone(), value.clone());
        }

        let id = self.graph.add_node(name, spec.kind(), merged);
        Ok(Fragment {
            entries: vec![id],
            exits: vec![id],
            nodes: vec![id],
            segments: Vec::new(),
        })
    }

    fn lower_seq(
        &mut self,
        left: &Expr,
        right: &Expr,
        link: crate::lang::LinkKind,
    ) -> Result<Fragment, CompileError> {
        let mut fl = self.lower(left)?;
        let mut fr = self.lower(right)?;

        let source_entries = fr
            .entries
            .iter()
            .filter(|&&n| self.graph.node(n).kind == NodeKind::Source)
            .count();

        if source_entries == fr.entries.len() {
            // The right side starts with sources: no frames flow across
            // this sequence. It orders segments in time instead.
            self.ensure_segments(&mut fl);
            self.ensure_segments(&mut fr);
            for &seg in &fr.segments {
                let predecessors = fl.segments.clone();
                let segment = self.graph.segment_mut(seg);
                for p in predecessors {
                    if !segment.after.contains(&p) {
                        segment.after.push(p);
                    }
                }
            }
        } else if source_entries > 0 {
            let name = fr
                .entries
                .iter()
                .find(|&&n| self.graph.node(n).kind == NodeKind::Source)
                .map(|&n| self.graph.node(n).name.clone())
                .unwrap_or_default();
            return Err(CompileError::KindMismatch {
                detail: format!("source '{}' cannot receive upstream frames", name),
            });
        } else {
            for &exit in &fl.exits {
                if self.graph.node(exit).kind == NodeKind::Sink {
                    return Err(CompileError::KindMismatch {
                        detail: format!(
                            "sink '{}' used mid-pipeline",
                            self.graph.node(exit).name
                        ),
                    });
                }
            }
            for &exit in &fl.exits {
                for &entry in &fr.entries {
                    let capacity = self.edge_capacity(link, exit, entry);
                    self.graph.add_edge(exit, entry, capacity);
                }
            }
        }

        let mut fragment = Fragment {
            entries: fl.entries.clone(),
            exits: fr.exits.clone(),
            nodes: Vec::new(),
            segments: Vec::new(),
        };
        fragment.absorb(fl);
        fragment.absorb(fr);
        Ok(fragment)
    }

    fn lower_par(&mut self, branches: &[Expr]) -> Result<Fragment, CompileError> {
        let mut fragment = Fragment {
            entries: Vec::new(),
            exits: Vec::new(),
            nodes: Vec::new(),
            segments: Vec::new(),
        };
        for branch in branches {
            let fb = self.lower(branch)?;
            fragment.entries.extend(fb.entries.iter().copied());
            fragment.exits.extend(fb.exits.iter().copied());
            fragment.absorb(fb);
        }
        Ok(fragment)
    }

    fn lower_timed(&mut self, inner: &Expr, seconds: f64) -> Result<Fragment, CompileError> {
        let mut fragment = self.lower(inner)?;
        let segment = self.graph.add_segment(Some(Duration::from_secs_f64(seconds)));
        for &node in &fragment.nodes {
            // Innermost timer wins: nested segments were assigned first
            if self.graph.node(node).segment.is_none() {
                self.graph.assign_segment(node, segment);
            }
        }
        fragment.segments.push(segment);
        Ok(fragment)
    }

    /// Wrap any still-unsegmented nodes of the fragment in an implicit
    /// (deadline-free) segment so temporal ordering has something to gate.
    fn ensure_segments(&mut self, fragment: &mut Fragment) {
        let loose: Vec<NodeId> = fragment
            .nodes
            .iter()
            .copied()
            .filter(|&n| self.graph.node(n).segment.is_none())
            .collect();
        if loose.is_empty() {
            return;
        }
        let segment = self.graph.add_segment(None);
        for node in loose {
            self.graph.assign_segment(node, segment);
        }
        fragment.segments.push(segment);
    }

    fn edge_capacity(
        &self,
        link: crate::lang::LinkKind,
        producer: NodeId,
        consumer: NodeId,
    ) -> usize {
        let mut capacity = match link {
            crate::lang::LinkKind::Sync => self.sync_capacity,
            crate::lang::LinkKind::Async => self.async_capacity,
        };
        if let Some(buffer) = Self::buffer_param(self.graph.node(producer)) {
            capacity = buffer;
        }
        // A sink's own buffer declaration wins for the edge feeding it.
        let consumer_node = self.graph.node(consumer);
        if consumer_node.kind == NodeKind::Sink
            && let Some(buffer) = Self::buffer_param(consumer_node)
        {
            capacity = buffer;
        }
        capacity
    }

    fn buffer_param(node: &super::GraphNode) -> Option<usize> {
        let value = node.params.get("buffer")?;
        match value {
            Value::Int(v) if *v >= 1 => Some(*v as usize),
            Value::Float(v) if *v >= 1.0 && v.fract() == 0.0 => Some(*v as usize),
            other => {
                warn!(
                    node = %node.name,
                    value = %other,
                    "'buffer' must be a positive integer, keeping default capacity"
                );
                None
            }
        }
    }

    /// Check the structural invariants: at least one source and one sink,
    /// and every node on a path from some source to some sink.
    fn validate(&self) -> Result<(), CompileError> {
        let graph = &self.graph;
        if graph.nodes().is_empty() || graph.sources().next().is_none() {
            return Err(CompileError::NoSource);
        }
        if graph.sinks().next().is_none() {
            return Err(CompileError::NoSink);
        }

        let fed = self.reachable(graph.sources().map(|n| n.id), true);
        if fed.len() != graph.nodes().len() {
            return Err(CompileError::NoSource);
        }

        let draining = self.reachable(graph.sinks().map(|n| n.id), false);
        if draining.len() != graph.nodes().len() {
            return Err(CompileError::NoSink);
        }

        Ok(())
    }

    fn reachable(&self, roots: impl Iterator<Item = NodeId>, forward: bool) -> HashSet<NodeId> {
        let graph = &self.graph;
        let mut visited: HashSet<NodeId> = roots.collect();
        let mut queue: Vec<NodeId> = visited.iter().copied().collect();
        while let Some(id) = queue.pop() {
            let node = graph.node(id);
            let edges = if forward { &node.outputs } else { &node.inputs };
            for &edge in edges {
                let next = if forward {
                    graph.edge(edge).consumer
                } else {
                    graph.edge(edge).producer
                };
                if visited.insert(next) {
                    queue.push(next);
                }
            }
        }
        visited
    }
}
