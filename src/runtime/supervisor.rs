//! Supervisor: wires a compiled graph into live workers and sees the run
//! through to the end
//!
//! Startup builds one bounded channel per edge and spawns one thread per
//! node, then the supervising loop tracks worker completions through a
//! notification channel, fires segment deadlines, releases gated segments
//! once their predecessors have fully drained, and reacts to cancellation.
//!
//! Shutdown ordering: a deadline or cancellation closes source output
//! edges; sources observe the close on their next push and exit, dropping
//! their channel endpoints; every downstream worker drains its inputs to
//! end-of-stream, closes its own outputs, and exits; the supervisor joins
//! workers as their completion notifications arrive.

use super::cancel::CancelToken;
use super::channel::{EdgeSender, FrameReceiver, frame_edge};
use super::config::RuntimeConfig;
use super::errors::RuntimeError;
use super::events::{EventHub, EventKind, RuntimeEvent};
use super::registry::FunctionRegistry;
use super::watchdog::Watchdog;
use super::worker::{WorkerContext, WorkerExit, run_worker};
use crate::graph::{EdgeId, Graph, NodeId, NodeKind, SegmentId};
use crossbeam_channel::{Receiver, Select, unbounded};
use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How a completed run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every segment completed and all workers drained cleanly
    Normal,
    /// The cancellation signal ended the run
    Cancelled,
    /// At least one worker turned fatal
    Failed { reason: String },
}

/// Per-segment runtime bookkeeping.
struct SegmentState {
    remaining: usize,
    released: bool,
    done: bool,
    deadline: Option<Duration>,
    deadline_at: Option<Instant>,
    fired: bool,
}

pub struct Supervisor {
    graph: Graph,
    config: RuntimeConfig,
    events: EventHub,
    events_rx: Option<Receiver<RuntimeEvent>>,
}

impl Supervisor {
    pub fn new(graph: Graph, config: RuntimeConfig) -> Self {
        let (events, events_rx) = EventHub::new();
        Self {
            graph,
            config,
            events,
            events_rx: Some(events_rx),
        }
    }

    /// Take the receiving end of the event stream. Call before `run`.
    pub fn take_events(&mut self) -> Option<Receiver<RuntimeEvent>> {
        self.events_rx.take()
    }

    /// Execute the graph to completion. Blocks the calling thread; returns
    /// once every worker has stopped (or the shutdown grace expired after
    /// cancellation).
    pub fn run(self, registry: &FunctionRegistry) -> Result<RunOutcome, RuntimeError> {
        let graph = &self.graph;
        let cancel = self.config.cancel.clone();

        // Resolve every node's transform up front; sources additionally get
        // their startup check so a dead source fails the run before any
        // worker thread exists.
        let mut transforms = Vec::with_capacity(graph.nodes().len());
        for node in graph.nodes() {
            let spec = registry
                .get(&node.function)
                .ok_or_else(|| RuntimeError::MissingFunction(node.function.clone()))?;
            let transform = spec.transform();
            if node.kind == NodeKind::Source {
                transform
                    .startup_check(&node.params)
                    .map_err(|e| RuntimeError::SourceStartup {
                        node: node.name.clone(),
                        detail: e.to_string(),
                    })?;
            }
            transforms.push(transform);
        }

        let watchdog = Watchdog::new();
        let monitor = watchdog.spawn_monitor();

        // One bounded channel per edge. The close tokens stay here so
        // deadlines and cancellation can shut edges from outside.
        let mut edge_senders: HashMap<EdgeId, EdgeSender> = HashMap::new();
        let mut edge_receivers: HashMap<EdgeId, FrameReceiver> = HashMap::new();
        let mut edge_closers: HashMap<EdgeId, CancelToken> = HashMap::new();
        for edge in graph.edges() {
            let (tx, rx, closed) = frame_edge(edge.capacity, cancel.clone());
            let tx = tx.with_watchdog(watchdog.register(&graph.node(edge.producer).name, "push"));
            let rx = rx.with_watchdog(watchdog.register(&graph.node(edge.consumer).name, "pop"));
            edge_senders.insert(edge.id, tx);
            edge_receivers.insert(edge.id, rx);
            edge_closers.insert(edge.id, closed);
        }

        // Segments with predecessors start gated; the gate opens when every
        // predecessor segment has fully stopped.
        let mut gates: HashMap<SegmentId, CancelToken> = HashMap::new();
        for segment in graph.segments() {
            if !segment.after.is_empty() {
                gates.insert(segment.id, CancelToken::new());
            }
        }

        let (completion_tx, completion_rx) = unbounded::<(NodeId, WorkerExit)>();
        let run_start = Instant::now();

        let mut handles: HashMap<NodeId, JoinHandle<()>> = HashMap::new();
        for (index, node) in graph.nodes().iter().enumerate() {
            let inputs: Vec<FrameReceiver> = node
                .inputs
                .iter()
                .filter_map(|id| edge_receivers.remove(id))
                .collect();
            let outputs: Vec<EdgeSender> = node
                .outputs
                .iter()
                .filter_map(|id| edge_senders.remove(id))
                .collect();

            let gate = match (node.kind, node.segment) {
                (NodeKind::Source, Some(segment)) => gates.get(&segment).cloned(),
                _ => None,
            };
            let context = WorkerContext {
                node: node.id,
                name: node.name.clone(),
                kind: node.kind,
                transform: transforms[index].clone(),
                params: node.params.clone(),
                inputs,
                outputs,
                cancel: cancel.clone(),
                gate,
                pacing: if node.kind == NodeKind::Source {
                    self.config.source_interval
                } else {
                    Duration::ZERO
                },
                failure_limit: self.config.consecutive_failure_limit,
                events: self.events.clone(),
                run_start,
            };

            let completion = completion_tx.clone();
            let node_id = node.id;
            let handle = thread::spawn(move || {
                // A panicking transform must not wedge the run: report the
                // worker as fatal and let its dropped channels cascade.
                let exit =
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run_worker(context)))
                        .unwrap_or(WorkerExit::Faulted);
                let _ = completion.send((node_id, exit));
            });
            handles.insert(node_id, handle);
        }
        drop(completion_tx);

        info!(
            "run started: {} workers, {} edges, {} segments",
            handles.len(),
            graph.edges().len(),
            graph.segments().len()
        );

        // Segment bookkeeping and the initial release pass.
        let mut segments: Vec<SegmentState> = graph
            .segments()
            .iter()
            .map(|s| SegmentState {
                remaining: s.members.len(),
                released: false,
                done: false,
                deadline: s.deadline,
                deadline_at: None,
                fired: false,
            })
            .collect();
        self.release_ready(&mut segments, &gates);

        let total = handles.len();
        let mut stopped = 0usize;
        let mut cancelled = false;
        let mut grace_deadline: Option<Instant> = None;
        let mut faulted: Vec<String> = Vec::new();

        while stopped < total {
            let now = Instant::now();

            // If the grace period after cancellation ran out, stop waiting.
            if let Some(grace) = grace_deadline
                && now >= grace
            {
                warn!("{} workers still running after grace period", total - stopped);
                break;
            }

            // Earliest pending wakeup: armed segment deadline or grace end.
            let mut wakeup: Option<Instant> = grace_deadline;
            for state in &segments {
                if state.released
                    && !state.done
                    && !state.fired
                    && let Some(at) = state.deadline_at
                {
                    wakeup = Some(wakeup.map_or(at, |w| w.min(at)));
                }
            }

            let mut sel = Select::new();
            let op_completion = sel.recv(&completion_rx);
            let op_cancel = if cancelled {
                usize::MAX
            } else {
                sel.recv(cancel.signal())
            };

            let selected = match wakeup {
                Some(at) => sel.select_timeout(at.saturating_duration_since(now)),
                None => Ok(sel.select()),
            };

            let Ok(oper) = selected else {
                // Timeout: fire due deadlines
                self.fire_due_deadlines(&mut segments, &edge_closers);
                continue;
            };

            let index = oper.index();
            if index == op_completion {
                match oper.recv(&completion_rx) {
                    Ok((node_id, exit)) => {
                        stopped += 1;
                        if exit == WorkerExit::Faulted {
                            faulted.push(self.graph.node(node_id).name.clone());
                        }
                        if let Some(handle) = handles.remove(&node_id)
                            && handle.join().is_err()
                        {
                            warn!("[{}] worker thread panicked", self.graph.node(node_id).name);
                        }
                        debug!(
                            "[{}] stopped ({}/{})",
                            self.graph.node(node_id).name,
                            stopped,
                            total
                        );

                        if let Some(segment) = self.graph.node(node_id).segment {
                            let state = &mut segments[segment.as_usize()];
                            state.remaining = state.remaining.saturating_sub(1);
                            if state.remaining == 0 && !state.done {
                                state.done = true;
                                debug!("segment {} complete", segment.as_usize());
                                self.release_ready(&mut segments, &gates);
                            }
                        }
                    }
                    Err(_) => break,
                }
            } else if index == op_cancel {
                let _ = oper.recv(cancel.signal());
                cancelled = true;
                info!("cancellation observed, draining");
                self.events.emit(None, EventKind::Cancelled, "external signal");
                // Close every source's output edges; the drain cascades
                for node in self.graph.sources() {
                    for edge in &node.outputs {
                        if let Some(closer) = edge_closers.get(edge) {
                            closer.cancel();
                        }
                    }
                }
                grace_deadline = Some(Instant::now() + self.config.shutdown_grace);
            }
        }

        watchdog.stop();
        let _ = monitor.join();

        // Stragglers (past grace) are left to die with their channels.
        if !handles.is_empty() {
            warn!("{} workers abandoned after grace period", handles.len());
        }

        let outcome = if cancelled {
            RunOutcome::Cancelled
        } else if !faulted.is_empty() {
            RunOutcome::Failed {
                reason: format!("fatal workers: {}", faulted.join(", ")),
            }
        } else {
            RunOutcome::Normal
        };
        info!("run finished: {:?} in {:?}", outcome, run_start.elapsed());
        Ok(outcome)
    }

    /// Release every gated segment whose predecessors have all stopped,
    /// arming its deadline at release time. Cascades for empty segments.
    fn release_ready(&self, segments: &mut [SegmentState], gates: &HashMap<SegmentId, CancelToken>) {
        loop {
            let mut progressed = false;
            for info in self.graph.segments() {
                let index = info.id.as_usize();
                if segments[index].released {
                    continue;
                }
                let ready = info
                    .after
                    .iter()
                    .all(|p| segments[p.as_usize()].done);
                if !ready {
                    continue;
                }

                segments[index].released = true;
                progressed = true;
                if let Some(deadline) = segments[index].deadline {
                    segments[index].deadline_at = Some(Instant::now() + deadline);
                }
                if let Some(gate) = gates.get(&info.id) {
                    debug!("segment {} released", index);
                    gate.cancel();
                }
                if segments[index].remaining == 0 {
                    segments[index].done = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }

    /// Close the output edges of every source in segments whose deadline
    /// has passed.
    fn fire_due_deadlines(
        &self,
        segments: &mut [SegmentState],
        edge_closers: &HashMap<EdgeId, CancelToken>,
    ) {
        let now = Instant::now();
        for info in self.graph.segments() {
            let index = info.id.as_usize();
            let state = &mut segments[index];
            if !state.released || state.done || state.fired {
                continue;
            }
            let Some(at) = state.deadline_at else { continue };
            if now < at {
                continue;
            }

            state.fired = true;
            info!("segment {} deadline fired", index);
            self.events.emit(
                None,
                EventKind::SegmentDeadline,
                format!("segment {}", index),
            );
            for &member in &info.members {
                let node = self.graph.node(member);
                if node.kind == NodeKind::Source {
                    for edge in &node.outputs {
                        if let Some(closer) = edge_closers.get(edge) {
                            closer.cancel();
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::compile_program;
    use crate::lang::{Params, Value, parse_source};
    use crate::runtime::frame::{Frame, PixelFormat};
    use crate::runtime::registry::{FunctionSpec, Transform, TransformError};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    fn value_frame(value: i64) -> Frame {
        Frame::new(1, 1, PixelFormat::Gray8).with_meta("value", Value::Int(value))
    }

    fn frame_value(frame: &Frame) -> i64 {
        frame.meta("value").and_then(Value::as_i64).unwrap_or(-1)
    }

    /// Source emitting 0, 1, 2, ... up to `limit` (0 = unbounded).
    fn counter_source(limit: u64) -> impl Transform {
        move |_: Option<Frame>, seq: u64, _: &Params| -> Result<Option<Frame>, TransformError> {
            if limit > 0 && seq >= limit {
                Ok(None)
            } else {
                Ok(Some(value_frame(seq as i64)))
            }
        }
    }

    /// Sink recording every frame's value.
    fn recording_sink(store: Arc<Mutex<Vec<i64>>>) -> impl Transform {
        move |frame: Option<Frame>, _: u64, _: &Params| -> Result<Option<Frame>, TransformError> {
            if let Some(frame) = frame {
                store.lock().unwrap().push(frame_value(&frame));
            }
            Ok(None)
        }
    }

    fn run_program(
        source: &str,
        registry: &FunctionRegistry,
        config: RuntimeConfig,
    ) -> Result<RunOutcome, RuntimeError> {
        let program = parse_source(source).unwrap();
        let graph = compile_program(&program, registry).unwrap();
        Supervisor::new(graph, config).run(registry)
    }

    #[test]
    fn test_linear_pipeline_delivers_in_order() {
        // src emits 0..100, op doubles, sink records
        let store = Arc::new(Mutex::new(Vec::new()));
        let mut registry = FunctionRegistry::new();
        registry.register("src", FunctionSpec::new(NodeKind::Source, counter_source(100)));
        registry.register(
            "double",
            FunctionSpec::new(
                NodeKind::Processor,
                |frame: Option<Frame>, _: u64, _: &Params| -> Result<Option<Frame>, TransformError> {
                    let frame = frame.unwrap();
                    let doubled = frame_value(&frame) * 2;
                    Ok(Some(frame.with_meta("value", Value::Int(doubled))))
                },
            ),
        );
        registry.register(
            "record",
            FunctionSpec::new(NodeKind::Sink, recording_sink(store.clone())),
        );

        let outcome = run_program(
            "src -> double -> record",
            &registry,
            RuntimeConfig::default().unpaced(),
        )
        .unwrap();

        assert_eq!(outcome, RunOutcome::Normal);
        let values = store.lock().unwrap();
        let expected: Vec<i64> = (0..100).map(|v| v * 2).collect();
        assert_eq!(*values, expected);
    }

    #[test]
    fn test_fan_out_broadcasts_to_both_branches() {
        let store = Arc::new(Mutex::new(Vec::<(String, i64)>::new()));
        let mut registry = FunctionRegistry::new();
        registry.register("src", FunctionSpec::new(NodeKind::Source, counter_source(50)));

        for branch in ["a", "b"] {
            registry.register(
                branch,
                FunctionSpec::new(
                    NodeKind::Processor,
                    move |frame: Option<Frame>, _: u64, _: &Params| -> Result<Option<Frame>, TransformError> {
                        Ok(frame.map(|f| f.with_meta("branch", Value::Str(branch.into()))))
                    },
                ),
            );
        }

        let tagged = store.clone();
        registry.register(
            "record",
            FunctionSpec::new(
                NodeKind::Sink,
                move |frame: Option<Frame>, _: u64, _: &Params| -> Result<Option<Frame>, TransformError> {
                    if let Some(frame) = frame {
                        let branch = frame
                            .meta("branch")
                            .and_then(Value::as_str)
                            .unwrap_or("?")
                            .to_string();
                        tagged.lock().unwrap().push((branch, frame_value(&frame)));
                    }
                    Ok(None)
                },
            ),
        );

        let outcome = run_program(
            "src -> (a | b) -> record",
            &registry,
            RuntimeConfig::default().unpaced(),
        )
        .unwrap();
        assert_eq!(outcome, RunOutcome::Normal);

        let records = store.lock().unwrap();
        for branch in ["a", "b"] {
            let values: Vec<i64> = records
                .iter()
                .filter(|(b, _)| b == branch)
                .map(|(_, v)| *v)
                .collect();
            // Every value, in per-branch FIFO order
            let expected: Vec<i64> = (0..50).collect();
            assert_eq!(values, expected, "branch {}", branch);
        }
    }

    #[test]
    fn test_backpressure_limits_free_running_source() {
        // Slow consumer (50 ms per frame), free-running source, capacity 10
        // edges: after ~1 s the source cannot have run ahead by more than
        // the queued capacity plus what the consumer managed to eat.
        let produced = Arc::new(AtomicU64::new(0));
        let counter = produced.clone();

        let mut registry = FunctionRegistry::new();
        registry.register(
            "src",
            FunctionSpec::new(
                NodeKind::Source,
                move |_: Option<Frame>, seq: u64, _: &Params| -> Result<Option<Frame>, TransformError> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(value_frame(seq as i64)))
                },
            ),
        );
        registry.register(
            "slow",
            FunctionSpec::new(
                NodeKind::Processor,
                |frame: Option<Frame>, _: u64, _: &Params| -> Result<Option<Frame>, TransformError> {
                    std::thread::sleep(Duration::from_millis(50));
                    Ok(frame)
                },
            ),
        );
        registry.register(
            "null",
            FunctionSpec::new(NodeKind::Sink, |_: Option<Frame>, _: u64, _: &Params| -> Result<Option<Frame>, TransformError> {
                Ok(None)
            }),
        );

        let config = RuntimeConfig::default().unpaced();
        let cancel = config.cancel.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(1));
            cancel.cancel();
        });

        let outcome = run_program("src -> slow -> null", &registry, config).unwrap();
        stopper.join().unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled);
        let count = produced.load(Ordering::SeqCst);
        // Two capacity-10 edges plus ~20 consumed frames, with headroom
        assert!(count <= 60, "source ran ahead: {} frames", count);
        assert!(count >= 10, "source barely ran: {} frames", count);
    }

    #[test]
    fn test_timed_sequence_runs_segments_back_to_back() {
        let store = Arc::new(Mutex::new(Vec::<(String, Instant)>::new()));
        let mut registry = FunctionRegistry::new();
        registry.register("srcA", FunctionSpec::new(NodeKind::Source, counter_source(0)));
        registry.register("srcB", FunctionSpec::new(NodeKind::Source, counter_source(0)));

        for name in ["recA", "recB"] {
            let tagged = store.clone();
            registry.register(
                name,
                FunctionSpec::new(
                    NodeKind::Sink,
                    move |frame: Option<Frame>, _: u64, _: &Params| -> Result<Option<Frame>, TransformError> {
                        if frame.is_some() {
                            tagged.lock().unwrap().push((name.to_string(), Instant::now()));
                        }
                        Ok(None)
                    },
                ),
            );
        }

        let start = Instant::now();
        let outcome = run_program(
            "pipeline a = srcA -> recA\n\
             pipeline b = srcB -> recB\n\
             a @ 0.5s -> b @ 0.5s",
            &registry,
            RuntimeConfig::default().with_source_interval(Duration::from_millis(5)),
        )
        .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(outcome, RunOutcome::Normal);
        assert!(
            elapsed >= Duration::from_millis(900) && elapsed <= Duration::from_secs(4),
            "elapsed: {:?}",
            elapsed
        );

        let records = store.lock().unwrap();
        let last_a = records
            .iter()
            .filter(|(n, _)| n == "recA")
            .map(|(_, t)| *t)
            .max()
            .expect("first segment produced nothing");
        let first_b = records
            .iter()
            .filter(|(n, _)| n == "recB")
            .map(|(_, t)| *t)
            .min()
            .expect("second segment produced nothing");
        assert!(last_a <= first_b, "segments overlapped");
    }

    #[test]
    fn test_timed_segment_bounds_wall_clock() {
        let store = Arc::new(Mutex::new(Vec::new()));
        let mut registry = FunctionRegistry::new();
        registry.register("src", FunctionSpec::new(NodeKind::Source, counter_source(0)));
        registry.register(
            "record",
            FunctionSpec::new(NodeKind::Sink, recording_sink(store.clone())),
        );

        let start = Instant::now();
        let outcome = run_program(
            "(src -> record) @ 0.5s",
            &registry,
            RuntimeConfig::default().with_source_interval(Duration::from_millis(5)),
        )
        .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(outcome, RunOutcome::Normal);
        assert!(!store.lock().unwrap().is_empty());
        assert!(
            elapsed >= Duration::from_millis(400) && elapsed <= Duration::from_millis(2500),
            "elapsed: {:?}",
            elapsed
        );
    }

    #[test]
    fn test_cancellation_terminates_promptly() {
        let store = Arc::new(Mutex::new(Vec::new()));
        let mut registry = FunctionRegistry::new();
        registry.register("src", FunctionSpec::new(NodeKind::Source, counter_source(0)));
        registry.register(
            "record",
            FunctionSpec::new(NodeKind::Sink, recording_sink(store.clone())),
        );

        let config = RuntimeConfig::default()
            .with_source_interval(Duration::from_millis(2))
            .with_shutdown_grace(Duration::from_secs(2));
        let cancel = config.cancel.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            cancel.cancel();
        });

        let start = Instant::now();
        let outcome = run_program("src -> record", &registry, config).unwrap();
        let elapsed = start.elapsed();
        stopper.join().unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(elapsed < Duration::from_millis(2300), "elapsed: {:?}", elapsed);
        assert!(!store.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fatal_worker_fails_the_run() {
        let mut registry = FunctionRegistry::new();
        registry.register("src", FunctionSpec::new(NodeKind::Source, counter_source(0)));
        registry.register(
            "broken",
            FunctionSpec::new(
                NodeKind::Processor,
                |_: Option<Frame>, _: u64, _: &Params| -> Result<Option<Frame>, TransformError> {
                    Err(TransformError::Failed("always fails".into()))
                },
            ),
        );
        registry.register(
            "null",
            FunctionSpec::new(NodeKind::Sink, |_: Option<Frame>, _: u64, _: &Params| -> Result<Option<Frame>, TransformError> {
                Ok(None)
            }),
        );

        let program = parse_source("src -> broken -> null").unwrap();
        let graph = compile_program(&program, &registry).unwrap();
        let mut supervisor = Supervisor::new(
            graph,
            RuntimeConfig::default().unpaced().with_failure_limit(4),
        );
        let events = supervisor.take_events().unwrap();

        let outcome = supervisor.run(&registry).unwrap();
        match outcome {
            RunOutcome::Failed { reason } => assert!(reason.contains("broken"), "{}", reason),
            other => panic!("expected failure, got {:?}", other),
        }

        let kinds: Vec<EventKind> = events.try_iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::TransformFault));
        assert!(kinds.contains(&EventKind::WorkerFatal));
    }

    #[test]
    fn test_dead_source_fails_before_start() {
        struct DeadCamera;
        impl Transform for DeadCamera {
            fn apply(
                &self,
                _frame: Option<Frame>,
                _seq: u64,
                _params: &Params,
            ) -> Result<Option<Frame>, TransformError> {
                Ok(None)
            }
            fn startup_check(&self, _params: &Params) -> Result<(), TransformError> {
                Err(TransformError::Unavailable("no capture device".into()))
            }
        }

        let mut registry = FunctionRegistry::new();
        registry.register("cam", FunctionSpec::new(NodeKind::Source, DeadCamera));
        registry.register(
            "null",
            FunctionSpec::new(NodeKind::Sink, |_: Option<Frame>, _: u64, _: &Params| -> Result<Option<Frame>, TransformError> {
                Ok(None)
            }),
        );

        let err = run_program("cam -> null", &registry, RuntimeConfig::default()).unwrap_err();
        match err {
            RuntimeError::SourceStartup { node, detail } => {
                assert!(node.starts_with("cam"));
                assert!(detail.contains("no capture device"));
            }
            other => panic!("expected startup error, got {:?}", other),
        }
    }

    #[test]
    fn test_panicking_transform_does_not_wedge_the_run() {
        let mut registry = FunctionRegistry::new();
        registry.register("src", FunctionSpec::new(NodeKind::Source, counter_source(0)));
        registry.register(
            "explode",
            FunctionSpec::new(
                NodeKind::Processor,
                |_: Option<Frame>, _: u64, _: &Params| -> Result<Option<Frame>, TransformError> {
                    panic!("transform bug")
                },
            ),
        );
        registry.register(
            "null",
            FunctionSpec::new(NodeKind::Sink, |_: Option<Frame>, _: u64, _: &Params| -> Result<Option<Frame>, TransformError> {
                Ok(None)
            }),
        );

        let outcome = run_program(
            "src -> explode -> null",
            &registry,
            RuntimeConfig::default().unpaced(),
        )
        .unwrap();
        assert!(matches!(outcome, RunOutcome::Failed { .. }), "got {:?}", outcome);
    }
}
