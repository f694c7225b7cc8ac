//! Streaming runtime: frames, channels, workers, and the supervisor

pub mod cancel;
pub mod channel;
pub mod config;
pub mod errors;
pub mod events;
pub mod frame;
pub mod registry;
pub mod supervisor;
pub mod watchdog;
pub mod worker;

pub use cancel::CancelToken;
pub use channel::{EdgeSender, FrameReceiver, MergeSelect, PopOutcome, PushOutcome};
pub use config::RuntimeConfig;
pub use errors::RuntimeError;
pub use events::{EventHub, EventKind, RuntimeEvent};
pub use frame::{Frame, PixelFormat};
pub use registry::{
    FunctionRegistry, FunctionSpec, Transform, TransformError, default_registry, register_function,
};
pub use supervisor::{RunOutcome, Supervisor};
pub use watchdog::{Watchdog, WatchdogHandle};
pub use worker::WorkerState;
