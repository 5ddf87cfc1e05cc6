//! Dispatch - queues of tasks drained in time-bounded slices on a single-threaded context.
//!
//! # Components
//!
//! - [`TaskQueue`]: the FIFO of pending tasks together with the active flag and
//!   wake capability, all behind one mutex
//! - [`Dispatcher`]: enqueue/drain/dispose state machine over a [`TaskQueue`]
//! - [`Poster`]: an async and a sync dispatcher sharing one execution context,
//!   with wake-ups routed by [`DispatchTag`]
//!
//! # Control flow
//!
//! 1. A producer enqueues a task. If the dispatcher was idle it becomes active
//!    and asks its [`WakeHandle`] for exactly one future drain.
//! 2. The context invokes the drain, which runs tasks in FIFO order.
//! 3. The drain stops when the queue is empty (going idle) or when the time
//!    budget is used up (re-arming with another wake and yielding the context).

pub mod dispatcher;
pub mod poster;
pub mod queue;

pub use dispatcher::{Dispatcher, DrainOutcome};
pub use poster::{Poster, PosterOptions};
pub use queue::TaskQueue;

use crate::context::ContextError;
use std::fmt;
use thiserror::Error;

/// Errors raised when handing a task to a dispatcher
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("dispatcher has been disposed")]
    Disposed,

    #[error("failed to wake the execution context: {0}")]
    Wake(#[from] ContextError),
}

/// Capability to request one future drain on the execution context.
///
/// Must be safe to call while a previous request is still pending.
pub trait WakeHandle: Send + Sync {
    fn wake(&self) -> Result<(), ContextError>;
}

impl<F> WakeHandle for F
where
    F: Fn() -> Result<(), ContextError> + Send + Sync,
{
    fn wake(&self) -> Result<(), ContextError> {
        self()
    }
}

/// Which of a poster's dispatchers a wake-up is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchTag {
    Async,
    Sync,
}

impl fmt::Display for DispatchTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchTag::Async => write!(f, "async"),
            DispatchTag::Sync => write!(f, "sync"),
        }
    }
}
