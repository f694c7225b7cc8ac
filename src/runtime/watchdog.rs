//! Blocked-channel-operation monitor
//!
//! Purely observational: each channel endpoint stores the start time of its
//! current blocking operation in an atomic, and a monitor thread scans
//! those timestamps once a second, logging any push or pop that has been
//! stuck past the threshold. Helps diagnose stalled pipelines (a sink that
//! stopped draining, a source blocked on a full edge) without touching the
//! data path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

const BLOCKED_THRESHOLD: Duration = Duration::from_secs(5);

#[inline(always)]
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

struct OpState {
    /// Millis since epoch when the current blocking op started, 0 if idle
    started: AtomicU64,
    warned: AtomicBool,
    node: String,
    operation: &'static str,
}

/// Handle held by one channel endpoint.
#[derive(Clone)]
pub struct WatchdogHandle {
    state: Arc<OpState>,
}

impl WatchdogHandle {
    #[inline(always)]
    fn start_operation(&self) {
        self.state.started.store(now_millis(), Ordering::Relaxed);
        self.state.warned.store(false, Ordering::Relaxed);
    }

    #[inline(always)]
    fn finish_operation(&self) {
        if self.state.warned.load(Ordering::Relaxed) {
            info!("[{}] {} unblocked", self.state.node, self.state.operation);
            self.state.warned.store(false, Ordering::Relaxed);
        }
        self.state.started.store(0, Ordering::Relaxed);
    }
}

/// Shared watchdog registry plus its monitor switch.
#[derive(Clone)]
pub struct Watchdog {
    ops: Arc<Mutex<Vec<Weak<OpState>>>>,
    running: Arc<AtomicBool>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self {
            ops: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Register one endpoint: `operation` is "push" or "pop".
    pub fn register(&self, node: &str, operation: &'static str) -> WatchdogHandle {
        let state = Arc::new(OpState {
            started: AtomicU64::new(0),
            warned: AtomicBool::new(false),
            node: node.to_string(),
            operation,
        });
        if let Ok(mut ops) = self.ops.lock() {
            ops.push(Arc::downgrade(&state));
        }
        WatchdogHandle { state }
    }

    fn scan(&self) {
        let now = now_millis();
        let threshold = BLOCKED_THRESHOLD.as_millis() as u64;
        let Ok(mut ops) = self.ops.lock() else { return };

        ops.retain(|weak| {
            let Some(state) = weak.upgrade() else {
                return false;
            };
            let started = state.started.load(Ordering::Relaxed);
            if started > 0 {
                let blocked = now.saturating_sub(started);
                if blocked > threshold && !state.warned.swap(true, Ordering::Relaxed) {
                    warn!(
                        "[{}] {} blocked for {:.1}s",
                        state.node,
                        state.operation,
                        blocked as f64 / 1000.0
                    );
                }
            }
            true
        });
    }

    /// Spawn the scan thread; runs until [`Watchdog::stop`].
    pub fn spawn_monitor(&self) -> JoinHandle<()> {
        let watchdog = self.clone();
        std::thread::spawn(move || {
            while watchdog.running.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_secs(1));
                watchdog.scan();
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard marking one blocking operation.
pub struct OperationGuard<'a> {
    handle: &'a WatchdogHandle,
}

impl<'a> OperationGuard<'a> {
    #[inline(always)]
    pub fn new(handle: &'a WatchdogHandle) -> Self {
        handle.start_operation();
        Self { handle }
    }
}

impl Drop for OperationGuard<'_> {
    #[inline(always)]
    fn drop(&mut self) {
        self.handle.finish_operation();
    }
}
