//! Runtime error types

use thiserror::Error;

/// Fatal conditions surfaced to the caller of a run. Per-frame transform
/// faults are not errors at this level; they flow through the event
/// stream and the isolate-and-continue policy instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A source could not start at all. The run was never started; no
    /// worker threads exist.
    #[error("source '{node}' failed to start: {detail}")]
    SourceStartup { node: String, detail: String },

    /// The registry handed to the run is missing a function the graph was
    /// compiled against.
    #[error("function '{0}' is not registered")]
    MissingFunction(String),
}
