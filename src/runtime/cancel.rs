//! Cancellation signal observable from blocked channel operations
//!
//! A [`CancelToken`] pairs an atomic flag with a rendezvous channel whose
//! sender is dropped on cancellation. A dropped sender makes the receiver
//! side permanently ready, so a `crossbeam_channel::Select` blocked on a
//! full or empty frame channel wakes immediately. The same construct backs
//! per-edge close signals and segment start gates.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Inner {
    flag: AtomicBool,
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

/// Shared cancellation handle. Cloning shares the signal.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded::<()>(0);
        Self {
            inner: Arc::new(Inner {
                flag: AtomicBool::new(false),
                tx: Mutex::new(Some(tx)),
                rx,
            }),
        }
    }

    /// Trip the signal. Idempotent; wakes every blocked observer.
    pub fn cancel(&self) {
        if !self.inner.flag.swap(true, Ordering::SeqCst) {
            // Dropping the sender disconnects the channel, which makes
            // every pending and future recv on it ready.
            if let Ok(mut guard) = self.inner.tx.lock() {
                guard.take();
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Receiver to register in a `Select`; becomes ready once cancelled.
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.rx
    }

    /// Sleep for at most `timeout`, returning early if cancelled.
    /// Returns true when the token was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self.inner.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.is_cancelled(),
            _ => true,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
