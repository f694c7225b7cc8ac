//! Per-node worker loops
//!
//! Every graph node runs one of three loops on its own thread: sources
//! produce and broadcast under pacing and backpressure, processors pop
//! (merging when they have several inputs), transform, and broadcast,
//! sinks pop and consume. All three follow the same lifecycle:
//! Starting -> Running -> Draining -> Stopped, with Faulted reachable from
//! Running when a transform keeps failing.
//!
//! Transform faults are isolated: the offending frame is discarded and the
//! worker keeps going. Past the consecutive-failure limit the worker turns
//! fatal, closes its outputs, and the end-of-stream cascades downstream.

use super::cancel::CancelToken;
use super::channel::{EdgeSender, FrameReceiver, MergeSelect, PopOutcome, broadcast};
use super::events::{EventHub, EventKind};
use super::registry::Transform;
use crate::graph::{NodeId, NodeKind};
use crate::lang::Params;
use crossbeam_channel::Select;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

/// Worker lifecycle state, used for logging and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Draining,
    Stopped,
    Faulted,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Starting => write!(f, "starting"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Draining => write!(f, "draining"),
            WorkerState::Stopped => write!(f, "stopped"),
            WorkerState::Faulted => write!(f, "faulted"),
        }
    }
}

/// How a worker ended, reported on the supervisor's completion channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    Clean,
    Faulted,
}

/// Everything one worker thread needs.
pub(crate) struct WorkerContext {
    pub node: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub transform: Arc<dyn Transform>,
    pub params: Params,
    pub inputs: Vec<FrameReceiver>,
    pub outputs: Vec<EdgeSender>,
    pub cancel: CancelToken,
    /// Segment start gate; the worker waits here before producing
    pub gate: Option<CancelToken>,
    /// Pacing interval for sources; zero means free-running
    pub pacing: Duration,
    pub failure_limit: usize,
    pub events: EventHub,
    pub run_start: Instant,
}

impl WorkerContext {
    fn fault(&self, seq: u64, consecutive: usize, err: &dyn fmt::Display) -> bool {
        error!(
            "[{}] transform fault at frame {}: {} (consecutive: {})",
            self.name, seq, err, consecutive
        );
        self.events.emit(
            Some(self.node),
            EventKind::TransformFault,
            format!("frame {}: {}", seq, err),
        );
        if consecutive >= self.failure_limit {
            error!(
                "[{}] {} consecutive failures, worker is fatal",
                self.name, consecutive
            );
            self.events.emit(
                Some(self.node),
                EventKind::WorkerFatal,
                format!("{} consecutive transform failures", consecutive),
            );
            return true;
        }
        false
    }

    /// Block on the segment gate. Returns false when the run was cancelled
    /// before the gate opened.
    fn wait_for_gate(&self) -> bool {
        let Some(gate) = &self.gate else { return true };
        if gate.is_cancelled() {
            return true;
        }
        if self.cancel.is_cancelled() {
            return false;
        }
        debug!("[{}] waiting for segment start", self.name);

        let mut sel = Select::new();
        let op_gate = sel.recv(gate.signal());
        let op_cancel = sel.recv(self.cancel.signal());
        let oper = sel.select();
        let index = oper.index();
        if index == op_gate {
            let _ = oper.recv(gate.signal());
            true
        } else {
            debug_assert_eq!(index, op_cancel);
            let _ = oper.recv(self.cancel.signal());
            false
        }
    }
}

/// Thread body for one node. Returns how the worker ended; closing the
/// output edges on the way out is what propagates end-of-stream.
pub(crate) fn run_worker(mut ctx: WorkerContext) -> WorkerExit {
    debug!("[{}] {} ({})", ctx.name, WorkerState::Starting, ctx.kind);

    let exit = match ctx.kind {
        NodeKind::Source => run_source(&ctx),
        NodeKind::Processor | NodeKind::Sink => run_consumer(&mut ctx),
    };

    for output in &ctx.outputs {
        output.close();
    }
    let state = match exit {
        WorkerExit::Clean => WorkerState::Stopped,
        WorkerExit::Faulted => WorkerState::Faulted,
    };
    info!("[{}] {}", ctx.name, state);
    exit
}

fn run_source(ctx: &WorkerContext) -> WorkerExit {
    if !ctx.wait_for_gate() {
        return WorkerExit::Clean;
    }
    debug!("[{}] {}", ctx.name, WorkerState::Running);

    let mut seq = 0u64;
    let mut consecutive = 0usize;

    loop {
        if ctx.cancel.is_cancelled() {
            return WorkerExit::Clean;
        }
        let tick = Instant::now();

        match ctx.transform.apply(None, seq, &ctx.params) {
            Ok(Some(mut frame)) => {
                consecutive = 0;
                frame.seq = seq;
                frame.timestamp = ctx.run_start.elapsed().as_secs_f64();
                seq += 1;
                trace!("[{}] produced frame {}", ctx.name, frame.seq);

                match broadcast(&ctx.outputs, frame) {
                    // Run cancelled mid-broadcast
                    None => return WorkerExit::Clean,
                    Some(0) => {
                        debug!("[{}] all outputs closed", ctx.name);
                        return WorkerExit::Clean;
                    }
                    Some(_) => {}
                }
            }
            Ok(None) => {
                debug!("[{}] stream exhausted after {} frames", ctx.name, seq);
                ctx.events.emit(
                    Some(ctx.node),
                    EventKind::SourceExhausted,
                    format!("{} frames", seq),
                );
                return WorkerExit::Clean;
            }
            Err(err) => {
                consecutive += 1;
                if ctx.fault(seq, consecutive, &err) {
                    return WorkerExit::Faulted;
                }
            }
        }

        if !ctx.pacing.is_zero() {
            let elapsed = tick.elapsed();
            if elapsed < ctx.pacing && ctx.cancel.wait_timeout(ctx.pacing - elapsed) {
                return WorkerExit::Clean;
            }
        }
    }
}

fn run_consumer(ctx: &mut WorkerContext) -> WorkerExit {
    debug!("[{}] {}", ctx.name, WorkerState::Running);

    let mut seq = 0u64;
    let mut consecutive = 0usize;

    loop {
        let outcome = if ctx.inputs.len() == 1 {
            ctx.inputs[0].pop()
        } else {
            MergeSelect::new(&mut ctx.inputs, ctx.cancel.clone()).pop()
        };

        let frame = match outcome {
            PopOutcome::Frame(frame) => frame,
            PopOutcome::EndOfStream => {
                debug!("[{}] {} complete", ctx.name, WorkerState::Draining);
                return WorkerExit::Clean;
            }
            PopOutcome::Cancelled => return WorkerExit::Clean,
        };

        match ctx.transform.apply(Some(frame), seq, &ctx.params) {
            Ok(Some(out)) => {
                consecutive = 0;
                seq += 1;
                match broadcast(&ctx.outputs, out) {
                    None => return WorkerExit::Clean,
                    Some(0) if !ctx.outputs.is_empty() => {
                        debug!("[{}] all outputs closed", ctx.name);
                        return WorkerExit::Clean;
                    }
                    Some(_) => {}
                }
            }
            // Transform swallowed the frame (sinks always land here)
            Ok(None) => {
                consecutive = 0;
                seq += 1;
            }
            Err(err) => {
                consecutive += 1;
                if ctx.fault(seq, consecutive, &err) {
                    return WorkerExit::Faulted;
                }
            }
        }
    }
}
