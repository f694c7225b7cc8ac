//! Function registry: name -> transform, kind, parameter defaults
//!
//! The registry is populated once before the first compilation and read
//! only afterwards. The core never looks inside a transform; it only needs
//! the name lookup and the declared kind.

use super::frame::Frame;
use crate::graph::NodeKind;
use crate::lang::Params;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Error raised by a transform invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("{0}")]
    Failed(String),

    /// Startup-time failure of a source (hardware missing, bad config).
    /// Surfaced before the run is considered started.
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// A frame transform. Sources are invoked with `None` and return
/// `Some(frame)` per produced frame, or `None` once exhausted (clean
/// end-of-stream). Processors map a frame to a frame (or `None` to drop
/// it). Sinks consume the frame and return `None`.
///
/// `seq` is the worker's invocation counter for this node; sources use it
/// as their frame index, so a transform can stay a pure function of its
/// inputs.
pub trait Transform: Send + Sync {
    fn apply(
        &self,
        frame: Option<Frame>,
        seq: u64,
        params: &Params,
    ) -> Result<Option<Frame>, TransformError>;

    /// Called for sources before any worker starts. An error here aborts
    /// the run before it begins.
    fn startup_check(&self, _params: &Params) -> Result<(), TransformError> {
        Ok(())
    }
}

impl<F> Transform for F
where
    F: Fn(Option<Frame>, u64, &Params) -> Result<Option<Frame>, TransformError> + Send + Sync,
{
    fn apply(
        &self,
        frame: Option<Frame>,
        seq: u64,
        params: &Params,
    ) -> Result<Option<Frame>, TransformError> {
        self(frame, seq, params)
    }
}

/// Registry entry: the transform plus everything the compiler needs to
/// know about it.
#[derive(Clone)]
pub struct FunctionSpec {
    kind: NodeKind,
    transform: Arc<dyn Transform>,
    defaults: Params,
    description: String,
}

impl FunctionSpec {
    pub fn new<T: Transform + 'static>(kind: NodeKind, transform: T) -> Self {
        Self {
            kind,
            transform: Arc::new(transform),
            defaults: Params::new(),
            description: String::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: Params) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_default(mut self, key: impl Into<String>, value: crate::lang::Value) -> Self {
        self.defaults.insert(key.into(), value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn transform(&self) -> Arc<dyn Transform> {
        Arc::clone(&self.transform)
    }

    pub fn defaults(&self) -> &Params {
        &self.defaults
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Name -> function mapping.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionSpec>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in catalog.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::functions::register_builtins(&mut registry);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, spec: FunctionSpec) {
        self.functions.insert(name.into(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(name)
    }

    pub fn kind(&self, name: &str) -> Option<NodeKind> {
        self.functions.get(name).map(|spec| spec.kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// All registered names, sorted for stable listings.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

lazy_static::lazy_static! {
    static ref DEFAULT_REGISTRY: Mutex<FunctionRegistry> = Mutex::new(FunctionRegistry::with_builtins());
}

/// Lock the process-wide default registry (built-ins plus anything added
/// via [`register_function`]).
pub fn default_registry() -> MutexGuard<'static, FunctionRegistry> {
    DEFAULT_REGISTRY
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Add a function to the process-wide registry. Call before the first
/// compilation; the registry is treated as read-only once pipelines run.
pub fn register_function(name: impl Into<String>, spec: FunctionSpec) {
    default_registry().register(name, spec);
}
