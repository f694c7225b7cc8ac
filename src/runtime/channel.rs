//! Bounded frame channels connecting graph nodes
//!
//! Every edge of the compiled graph becomes one bounded crossbeam channel
//! with exactly one producer and one consumer. Backpressure is the channel
//! filling up: `push` blocks until the consumer drains, the edge is closed,
//! or the run is cancelled. The consumer observes end-of-stream when the
//! producer's endpoint is gone and the queue is drained, so no frame that
//! was accepted by `push` is ever lost to shutdown ordering.
//!
//! Closing an edge ([`EdgeSender::close`] or the supervisor's per-edge
//! close handle) wakes a blocked producer immediately; the producer then
//! drops its endpoint, which in turn surfaces end-of-stream downstream.

use super::cancel::CancelToken;
use super::frame::Frame;
use super::watchdog::{OperationGuard, WatchdogHandle};
use crossbeam_channel::{Receiver, Select, Sender, TryRecvError, bounded};
use std::time::Duration;
use tracing::trace;

/// Result of a blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame enqueued
    Pushed,
    /// Edge closed (or consumer gone); frame not enqueued
    Closed,
    /// Run cancelled; frame not enqueued
    Cancelled,
}

/// Result of a blocking pop.
#[derive(Debug, Clone, PartialEq)]
pub enum PopOutcome {
    Frame(Frame),
    /// Producer finished and the queue is drained
    EndOfStream,
    /// Run cancelled
    Cancelled,
}

/// Create one bounded edge. The supervisor keeps the close token to be
/// able to shut the edge from outside (segment deadlines).
pub fn frame_edge(
    capacity: usize,
    cancel: CancelToken,
) -> (EdgeSender, FrameReceiver, CancelToken) {
    let (tx, rx) = bounded::<Frame>(capacity.max(1));
    let closed = CancelToken::new();
    let sender = EdgeSender {
        tx,
        closed: closed.clone(),
        cancel: cancel.clone(),
        watchdog: None,
    };
    let receiver = FrameReceiver {
        rx,
        cancel,
        eos: false,
        watchdog: None,
    };
    (sender, receiver, closed)
}

/// Producer endpoint of one edge.
pub struct EdgeSender {
    tx: Sender<Frame>,
    closed: CancelToken,
    cancel: CancelToken,
    watchdog: Option<WatchdogHandle>,
}

impl EdgeSender {
    pub fn with_watchdog(mut self, handle: WatchdogHandle) -> Self {
        self.watchdog = Some(handle);
        self
    }

    /// Block until the frame is enqueued, the edge closes, or the run is
    /// cancelled. Never drops a frame silently: a non-`Pushed` outcome
    /// means the frame was not enqueued.
    pub fn push(&self, frame: Frame) -> PushOutcome {
        if self.closed.is_cancelled() {
            return PushOutcome::Closed;
        }
        if self.cancel.is_cancelled() {
            return PushOutcome::Cancelled;
        }

        let _guard = self.watchdog.as_ref().map(OperationGuard::new);

        let mut sel = Select::new();
        let op_send = sel.send(&self.tx);
        let op_closed = sel.recv(self.closed.signal());
        let op_cancel = sel.recv(self.cancel.signal());

        let oper = sel.select();
        match oper.index() {
            i if i == op_send => match oper.send(&self.tx, frame) {
                Ok(()) => PushOutcome::Pushed,
                // Consumer endpoint dropped
                Err(_) => PushOutcome::Closed,
            },
            i if i == op_closed => {
                let _ = oper.recv(self.closed.signal());
                PushOutcome::Closed
            }
            i if i == op_cancel => {
                let _ = oper.recv(self.cancel.signal());
                PushOutcome::Cancelled
            }
            _ => unreachable!("selected unknown operation"),
        }
    }

    /// Close the edge. Idempotent; wakes a blocked `push` immediately.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Consumer endpoint of one edge.
pub struct FrameReceiver {
    rx: Receiver<Frame>,
    cancel: CancelToken,
    /// Once end-of-stream has been observed it is cached, so every later
    /// pop reports it immediately.
    eos: bool,
    watchdog: Option<WatchdogHandle>,
}

impl FrameReceiver {
    pub fn with_watchdog(mut self, handle: WatchdogHandle) -> Self {
        self.watchdog = Some(handle);
        self
    }

    pub fn is_eos(&self) -> bool {
        self.eos
    }

    /// Non-blocking probe. `None` means the queue is empty but the
    /// producer is still alive.
    fn poll(&mut self) -> Option<PopOutcome> {
        if self.eos {
            return Some(PopOutcome::EndOfStream);
        }
        match self.rx.try_recv() {
            Ok(frame) => Some(PopOutcome::Frame(frame)),
            Err(TryRecvError::Disconnected) => {
                self.eos = true;
                Some(PopOutcome::EndOfStream)
            }
            Err(TryRecvError::Empty) => None,
        }
    }

    /// Block until a frame arrives, the producer is done and the queue is
    /// drained, or the run is cancelled.
    pub fn pop(&mut self) -> PopOutcome {
        if let Some(outcome) = self.poll() {
            return outcome;
        }
        if self.cancel.is_cancelled() {
            return PopOutcome::Cancelled;
        }

        let _guard = self.watchdog.as_ref().map(OperationGuard::new);

        let mut sel = Select::new();
        let op_data = sel.recv(&self.rx);
        let op_cancel = sel.recv(self.cancel.signal());

        let oper = sel.select();
        match oper.index() {
            i if i == op_data => match oper.recv(&self.rx) {
                Ok(frame) => PopOutcome::Frame(frame),
                Err(_) => {
                    self.eos = true;
                    trace!("edge drained to end-of-stream");
                    PopOutcome::EndOfStream
                }
            },
            i if i == op_cancel => {
                let _ = oper.recv(self.cancel.signal());
                PopOutcome::Cancelled
            }
            _ => unreachable!("selected unknown operation"),
        }
    }

    /// Like [`FrameReceiver::pop`] with an upper bound on the wait.
    /// `None` means the timeout elapsed.
    pub fn pop_timeout(&mut self, timeout: Duration) -> Option<PopOutcome> {
        if let Some(outcome) = self.poll() {
            return Some(outcome);
        }
        if self.cancel.is_cancelled() {
            return Some(PopOutcome::Cancelled);
        }

        let _guard = self.watchdog.as_ref().map(OperationGuard::new);

        let mut sel = Select::new();
        let op_data = sel.recv(&self.rx);
        let op_cancel = sel.recv(self.cancel.signal());

        let Ok(oper) = sel.select_timeout(timeout) else {
            return None;
        };
        match oper.index() {
            i if i == op_data => match oper.recv(&self.rx) {
                Ok(frame) => Some(PopOutcome::Frame(frame)),
                Err(_) => {
                    self.eos = true;
                    Some(PopOutcome::EndOfStream)
                }
            },
            i if i == op_cancel => {
                let _ = oper.recv(self.cancel.signal());
                Some(PopOutcome::Cancelled)
            }
            _ => unreachable!("selected unknown operation"),
        }
    }
}

/// Fair fan-in across a node's input edges.
///
/// Frames are forwarded in arrival order; when several inputs are ready the
/// underlying select picks among them uniformly, which keeps the merge fair
/// over the lifetime of the run. Inputs that reach end-of-stream are
/// skipped; the merge itself ends when every input has ended.
pub struct MergeSelect<'a> {
    inputs: &'a mut [FrameReceiver],
    cancel: CancelToken,
}

enum Woke {
    Data(usize, Result<Frame, crossbeam_channel::RecvError>),
    Cancelled,
}

impl<'a> MergeSelect<'a> {
    pub fn new(inputs: &'a mut [FrameReceiver], cancel: CancelToken) -> Self {
        Self { inputs, cancel }
    }

    /// Pop the next frame from whichever input has one, in arrival order.
    pub fn pop(&mut self) -> PopOutcome {
        loop {
            let mut live = 0usize;
            for input in self.inputs.iter_mut() {
                if input.eos {
                    continue;
                }
                match input.poll() {
                    Some(PopOutcome::Frame(frame)) => return PopOutcome::Frame(frame),
                    Some(_) => continue,
                    None => live += 1,
                }
            }
            if live == 0 {
                return PopOutcome::EndOfStream;
            }
            if self.cancel.is_cancelled() {
                return PopOutcome::Cancelled;
            }

            let woke = {
                let mut sel = Select::new();
                let mut index_map = Vec::with_capacity(live);
                for (i, input) in self.inputs.iter().enumerate() {
                    if !input.eos {
                        sel.recv(&input.rx);
                        index_map.push(i);
                    }
                }
                let op_cancel = sel.recv(self.cancel.signal());

                let oper = sel.select();
                let selected = oper.index();
                if selected == op_cancel {
                    let _ = oper.recv(self.cancel.signal());
                    Woke::Cancelled
                } else {
                    let input = index_map[selected];
                    Woke::Data(input, oper.recv(&self.inputs[input].rx))
                }
            };

            match woke {
                Woke::Cancelled => return PopOutcome::Cancelled,
                Woke::Data(_, Ok(frame)) => return PopOutcome::Frame(frame),
                Woke::Data(input, Err(_)) => {
                    self.inputs[input].eos = true;
                    // Re-scan: other inputs may still be live
                }
            }
        }
    }
}

/// Broadcast one frame to every output edge of a node. The pixel buffer is
/// shared between the copies; the last edge receives the original.
///
/// Returns how many edges accepted the frame, or `None` when the run was
/// cancelled mid-broadcast.
pub fn broadcast(outputs: &[EdgeSender], frame: Frame) -> Option<usize> {
    let Some((last, rest)) = outputs.split_last() else {
        return Some(0);
    };
    let mut delivered = 0usize;
    for output in rest {
        match output.push(frame.clone()) {
            PushOutcome::Pushed => delivered += 1,
            PushOutcome::Closed => {}
            PushOutcome::Cancelled => return None,
        }
    }
    match last.push(frame) {
        PushOutcome::Pushed => delivered += 1,
        PushOutcome::Closed => {}
        PushOutcome::Cancelled => return None,
    }
    Some(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::frame::PixelFormat;
    use std::thread;
    use std::time::Instant;

    fn frame(seq: u64) -> Frame {
        let mut f = Frame::new(2, 2, PixelFormat::Gray8);
        f.seq = seq;
        f
    }

    fn expect_frame(outcome: PopOutcome) -> Frame {
        match outcome {
            PopOutcome::Frame(f) => f,
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_fifo_order() {
        let cancel = CancelToken::new();
        let (tx, mut rx, _closed) = frame_edge(10, cancel);

        for seq in 0..5 {
            assert_eq!(tx.push(frame(seq)), PushOutcome::Pushed);
        }
        for seq in 0..5 {
            assert_eq!(expect_frame(rx.pop()).seq, seq);
        }
    }

    #[test]
    fn test_eos_after_sender_dropped_and_drained() {
        let cancel = CancelToken::new();
        let (tx, mut rx, _closed) = frame_edge(10, cancel);

        tx.push(frame(0));
        tx.push(frame(1));
        drop(tx);

        assert_eq!(expect_frame(rx.pop()).seq, 0);
        assert_eq!(expect_frame(rx.pop()).seq, 1);
        assert_eq!(rx.pop(), PopOutcome::EndOfStream);
        // Cached
        assert_eq!(rx.pop(), PopOutcome::EndOfStream);
        assert!(rx.is_eos());
    }

    #[test]
    fn test_push_blocks_at_capacity() {
        let cancel = CancelToken::new();
        let (tx, mut rx, _closed) = frame_edge(2, cancel);

        assert_eq!(tx.push(frame(0)), PushOutcome::Pushed);
        assert_eq!(tx.push(frame(1)), PushOutcome::Pushed);

        let handle = thread::spawn(move || {
            let start = Instant::now();
            let outcome = tx.push(frame(2));
            (outcome, start.elapsed())
        });

        thread::sleep(Duration::from_millis(100));
        // Producer must still be blocked; make room
        assert_eq!(expect_frame(rx.pop()).seq, 0);

        let (outcome, blocked) = handle.join().unwrap();
        assert_eq!(outcome, PushOutcome::Pushed);
        assert!(blocked >= Duration::from_millis(80), "did not block: {:?}", blocked);
        assert_eq!(expect_frame(rx.pop()).seq, 1);
        assert_eq!(expect_frame(rx.pop()).seq, 2);
    }

    #[test]
    fn test_close_wakes_blocked_pusher() {
        let cancel = CancelToken::new();
        let (tx, _rx, closed) = frame_edge(1, cancel);

        assert_eq!(tx.push(frame(0)), PushOutcome::Pushed);

        let handle = thread::spawn(move || tx.push(frame(1)));
        thread::sleep(Duration::from_millis(50));
        closed.cancel();

        assert_eq!(handle.join().unwrap(), PushOutcome::Closed);
    }

    #[test]
    fn test_close_is_idempotent() {
        let cancel = CancelToken::new();
        let (tx, _rx, _closed) = frame_edge(1, cancel);
        tx.close();
        tx.close();
        assert!(tx.is_closed());
        assert_eq!(tx.push(frame(0)), PushOutcome::Closed);
    }

    #[test]
    fn test_cancel_wakes_blocked_popper() {
        let cancel = CancelToken::new();
        let (_tx, mut rx, _closed) = frame_edge(1, cancel.clone());

        let handle = thread::spawn(move || rx.pop());
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();

        assert_eq!(handle.join().unwrap(), PopOutcome::Cancelled);
    }

    #[test]
    fn test_cancel_wakes_blocked_pusher() {
        let cancel = CancelToken::new();
        let (tx, _rx, _closed) = frame_edge(1, cancel.clone());
        tx.push(frame(0));

        let handle = thread::spawn(move || tx.push(frame(1)));
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();

        assert_eq!(handle.join().unwrap(), PushOutcome::Cancelled);
    }

    #[test]
    fn test_pop_timeout() {
        let cancel = CancelToken::new();
        let (tx, mut rx, _closed) = frame_edge(1, cancel);

        assert_eq!(rx.pop_timeout(Duration::from_millis(20)), None);
        tx.push(frame(7));
        let outcome = rx.pop_timeout(Duration::from_millis(20)).unwrap();
        assert_eq!(expect_frame(outcome).seq, 7);
    }

    #[test]
    fn test_push_to_dropped_receiver_reports_closed() {
        let cancel = CancelToken::new();
        let (tx, rx, _closed) = frame_edge(1, cancel);
        drop(rx);
        assert_eq!(tx.push(frame(0)), PushOutcome::Closed);
    }

    #[test]
    fn test_merge_interleaves_in_arrival_order() {
        let cancel = CancelToken::new();
        let (tx_a, rx_a, _ca) = frame_edge(10, cancel.clone());
        let (tx_b, rx_b, _cb) = frame_edge(10, cancel.clone());

        tx_a.push(frame(1));
        tx_b.push(frame(2));
        tx_a.push(frame(3));
        drop(tx_a);
        drop(tx_b);

        let mut inputs = vec![rx_a, rx_b];
        let mut merge = MergeSelect::new(&mut inputs, cancel);

        let mut seen = Vec::new();
        loop {
            match merge.pop() {
                PopOutcome::Frame(f) => seen.push(f.seq),
                PopOutcome::EndOfStream => break,
                PopOutcome::Cancelled => panic!("unexpected cancellation"),
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_merge_survives_one_input_ending() {
        let cancel = CancelToken::new();
        let (tx_a, rx_a, _ca) = frame_edge(10, cancel.clone());
        let (tx_b, rx_b, _cb) = frame_edge(10, cancel.clone());

        drop(tx_a);
        tx_b.push(frame(9));

        let mut inputs = vec![rx_a, rx_b];
        let mut merge = MergeSelect::new(&mut inputs, cancel);
        assert_eq!(expect_frame(merge.pop()).seq, 9);

        drop(tx_b);
        assert_eq!(merge.pop(), PopOutcome::EndOfStream);
    }

    #[test]
    fn test_merge_observes_cancellation() {
        let cancel = CancelToken::new();
        let (_tx_a, rx_a, _ca) = frame_edge(10, cancel.clone());
        let (_tx_b, rx_b, _cb) = frame_edge(10, cancel.clone());

        let token = cancel.clone();
        let handle = thread::spawn(move || {
            let mut inputs = vec![rx_a, rx_b];
            MergeSelect::new(&mut inputs, token).pop()
        });
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
        assert_eq!(handle.join().unwrap(), PopOutcome::Cancelled);
    }

    #[test]
    fn test_broadcast_delivers_to_all() {
        let cancel = CancelToken::new();
        let (tx_a, mut rx_a, _ca) = frame_edge(10, cancel.clone());
        let (tx_b, mut rx_b, _cb) = frame_edge(10, cancel);

        let delivered = broadcast(&[tx_a, tx_b], frame(5)).unwrap();
        assert_eq!(delivered, 2);

        let a = expect_frame(rx_a.pop());
        let b = expect_frame(rx_b.pop());
        assert_eq!(a.seq, 5);
        assert_eq!(b.seq, 5);
        // Same shared pixel buffer
        assert_eq!(a.pixels().as_ptr(), b.pixels().as_ptr());
    }

    #[test]
    fn test_broadcast_skips_closed_edges() {
        let cancel = CancelToken::new();
        let (tx_a, _rx_a, _ca) = frame_edge(10, cancel.clone());
        let (tx_b, mut rx_b, _cb) = frame_edge(10, cancel);

        tx_a.close();
        let delivered = broadcast(&[tx_a, tx_b], frame(1)).unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(expect_frame(rx_b.pop()).seq, 1);
    }
}
