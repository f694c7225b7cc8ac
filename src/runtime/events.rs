//! Structured runtime event stream
//!
//! Workers and the supervisor report noteworthy conditions here; the host
//! can take the receiving end before the run starts. Events are advisory:
//! dropping the receiver does not affect the run.

use crate::graph::NodeId;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::fmt;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A transform raised; the frame was discarded and the worker kept going
    TransformFault,
    /// A worker hit the consecutive-failure limit and shut down
    WorkerFatal,
    /// A segment deadline fired and its source edges were closed
    SegmentDeadline,
    /// A source reported its stream exhausted
    SourceExhausted,
    /// The run-wide cancellation signal was observed
    Cancelled,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::TransformFault => write!(f, "transform-fault"),
            EventKind::WorkerFatal => write!(f, "worker-fatal"),
            EventKind::SegmentDeadline => write!(f, "segment-deadline"),
            EventKind::SourceExhausted => write!(f, "source-exhausted"),
            EventKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeEvent {
    pub timestamp: SystemTime,
    /// Originating node, when the event is node-scoped
    pub node: Option<NodeId>,
    pub kind: EventKind,
    pub detail: String,
}

/// Cloneable emitting end of the event stream.
#[derive(Clone)]
pub struct EventHub {
    tx: Sender<RuntimeEvent>,
}

impl EventHub {
    pub fn new() -> (Self, Receiver<RuntimeEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    pub fn emit(&self, node: Option<NodeId>, kind: EventKind, detail: impl Into<String>) {
        // Nobody listening is fine
        let _ = self.tx.send(RuntimeEvent {
            timestamp: SystemTime::now(),
            node,
            kind,
            detail: detail.into(),
        });
    }
}
