// Execution contexts - the single-threaded loops that drains run on
//
// This module contains:
// - ExecutionContext: "run this callback later on your thread" plus a thread-affinity query
// - ThreadLooper: a dedicated named thread draining a callback channel
// - PumpedLooper: a loop owned by an existing thread (typically the UI thread) that pumps it

pub mod looper;
pub mod pumped;

pub use looper::ThreadLooper;
pub use pumped::PumpedLooper;

use thiserror::Error;

/// Callback posted to an execution context
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Errors raised by an execution context
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("execution context is closed")]
    Closed,

    #[error("looper can only be pumped by the thread that created it")]
    NotOwner,

    #[error("failed to spawn looper thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A single-threaded context that runs posted callbacks one at a time.
///
/// `post` schedules exactly one future invocation of `callback`. It must be
/// safe to call while an earlier posted callback is still pending, and from
/// any thread. Callbacks run strictly in posting order.
pub trait ExecutionContext: Send + Sync {
    /// Schedule `callback` to run on this context
    fn post(&self, callback: Callback) -> Result<(), ContextError>;

    /// Whether the calling thread is the one this context runs callbacks on
    fn is_current(&self) -> bool;
}
