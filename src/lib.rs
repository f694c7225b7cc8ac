//! Pipeline language and streaming runtime for real-time video frame
//! processing
//!
//! Programs written in a small dataflow language compile into a graph of
//! processing nodes connected by bounded channels, which then runs as one
//! worker thread per node under a supervisor.
//!
//! # Architecture
//!
//! - **lang**: lexer and recursive-descent parser producing the syntax tree
//! - **graph**: the compiler, lowering programs into an id-arena execution
//!   graph of nodes, bounded edges, and timed segments
//! - **runtime**: bounded frame channels with backpressure, a function
//!   registry, per-node workers, and the supervising run loop
//! - **functions**: the built-in catalog of sources, processors, and sinks
//!
//! # Example
//!
//! ```no_run
//! use framepipe::{RuntimeConfig, run};
//!
//! let registry = framepipe::FunctionRegistry::with_builtins();
//! let outcome = run(
//!     "test-pattern -> grayscale -> count @ 2s",
//!     &registry,
//!     RuntimeConfig::default(),
//! )?;
//! # Ok::<(), framepipe::PipelineError>(())
//! ```

use thiserror::Error;

pub mod functions;
pub mod graph;
pub mod lang;
pub mod runtime;

pub use graph::{CompileError, Graph, NodeKind, compile_program};
pub use lang::{Expr, LexError, ParseError, Params, Program, Value, parse_source};
pub use runtime::{
    CancelToken, Frame, FunctionRegistry, FunctionSpec, PixelFormat, RunOutcome, RuntimeConfig,
    RuntimeError, RuntimeEvent, Supervisor, Transform, TransformError, default_registry,
    register_function,
};

/// Any failure on the way from source text to a finished run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Parse and compile a program against a registry.
pub fn compile(source: &str, registry: &FunctionRegistry) -> Result<Graph, PipelineError> {
    let program = parse_source(source)?;
    let graph = graph::Compiler::new(registry).compile(&program)?;
    Ok(graph)
}

/// Parse and compile with edge capacities taken from a runtime config.
pub fn compile_with(
    source: &str,
    registry: &FunctionRegistry,
    config: &RuntimeConfig,
) -> Result<Graph, PipelineError> {
    let program = parse_source(source)?;
    let graph = graph::Compiler::new(registry)
        .with_edge_capacities(config.default_edge_capacity, config.async_edge_capacity)
        .compile(&program)?;
    Ok(graph)
}

/// Compile and run a program to completion on the calling thread.
pub fn run(
    source: &str,
    registry: &FunctionRegistry,
    config: RuntimeConfig,
) -> Result<RunOutcome, PipelineError> {
    let graph = compile_with(source, registry, &config)?;
    let outcome = Supervisor::new(graph, config).run(registry)?;
    Ok(outcome)
}
