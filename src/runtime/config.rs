//! Runtime configuration

use super::cancel::CancelToken;
use std::time::Duration;

/// Knobs for one pipeline run, with the defaults the language assumes.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Pacing interval for free-running sources (default 1/30 s). Zero
    /// disables pacing entirely.
    pub source_interval: Duration,
    /// Capacity of `->` edges, in frames
    pub default_edge_capacity: usize,
    /// Capacity of `~>` edges, in frames
    pub async_edge_capacity: usize,
    /// Consecutive transform failures before a worker is considered fatal
    pub consecutive_failure_limit: usize,
    /// How long the supervisor waits for workers after cancellation or a
    /// deadline before giving up on stragglers
    pub shutdown_grace: Duration,
    /// Shared cancellation signal; the host keeps a clone to trip it
    pub cancel: CancelToken,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            source_interval: Duration::from_secs_f64(1.0 / 30.0),
            default_edge_capacity: 10,
            async_edge_capacity: 20,
            consecutive_failure_limit: 16,
            shutdown_grace: Duration::from_secs(2),
            cancel: CancelToken::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_interval(mut self, interval: Duration) -> Self {
        self.source_interval = interval;
        self
    }

    /// Free-running sources: no pacing sleep at all.
    pub fn unpaced(self) -> Self {
        self.with_source_interval(Duration::ZERO)
    }

    pub fn with_edge_capacities(mut self, sync: usize, async_: usize) -> Self {
        self.default_edge_capacity = sync.max(1);
        self.async_edge_capacity = async_.max(1);
        self
    }

    pub fn with_failure_limit(mut self, limit: usize) -> Self {
        self.consecutive_failure_limit = limit.max(1);
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}
