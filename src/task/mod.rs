//! Tasks - units of deferred work with run-once and cancellable semantics.
//!
//! Every task embeds a [`TaskCore`] that owns the completion flag, the per-task
//! lock and the weak back-reference to whichever [`TaskQueue`] currently holds
//! it. The [`Task`] trait builds `run`/`cancel`/`is_done` on top of that core, so
//! an implementation only has to say what `call` does.
//!
//! # Components
//!
//! - [`AsyncTask`]: fire-and-forget callback
//! - [`SyncTask`]: callback whose result (or panic) is handed to a blocked waiter
//!
//! # Locking
//!
//! The task lock is always taken before a queue lock, never after. The
//! back-reference cell is a leaf lock: nothing else is acquired while it is held.

pub mod async_task;
pub mod sync_task;

pub use async_task::AsyncTask;
pub use sync_task::{SyncTask, ValueSyncTask};

use crate::dispatch::{DispatchError, TaskQueue};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;

/// Errors reported to whoever waits on a task
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task was cancelled before it ran")]
    Cancelled,

    #[error("task did not complete in time (cancelled: {cancelled})")]
    TimedOut { cancelled: bool },

    #[error("task result was already taken")]
    ResultTaken,

    #[error("task could not be posted: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Process-unique task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// What a call to [`Task::run`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// `call()` ran to completion
    Completed,

    /// `call()` panicked; the panic was logged and the task marked done
    Panicked(String),

    /// The task had already run or been cancelled
    AlreadyDone,
}

/// Completion state shared by every task implementation.
///
/// `done` flips from `false` to `true` exactly once, while `run_lock` is held.
/// Readers use the atomic directly so `is_done` never blocks.
pub struct TaskCore {
    id: TaskId,
    done: AtomicBool,
    run_lock: Mutex<()>,
    queue: Mutex<Option<Weak<TaskQueue>>>,
}

impl TaskCore {
    pub fn new() -> Self {
        Self::with_state(false)
    }

    /// A core that is already done, for work that ran inline
    pub fn completed() -> Self {
        Self::with_state(true)
    }

    fn with_state(done: bool) -> Self {
        Self {
            id: TaskId::next(),
            done: AtomicBool::new(done),
            run_lock: Mutex::new(()),
            queue: Mutex::new(None),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Attach (or replace) the back-reference to the holding queue
    pub fn attach(&self, queue: &Arc<TaskQueue>) {
        *lock_unpoisoned(&self.queue) = Some(Arc::downgrade(queue));
    }

    /// Drop the back-reference
    pub fn detach(&self) {
        lock_unpoisoned(&self.queue).take();
    }

    /// Whether a queue back-reference is currently attached
    pub fn is_attached(&self) -> bool {
        lock_unpoisoned(&self.queue).is_some()
    }

    /// Execute `call` if and only if the task is not done yet.
    ///
    /// A panic escaping `call` is caught here: the task is still marked done
    /// and the panic is reported as [`RunOutcome::Panicked`].
    pub fn run_once(&self, call: impl FnOnce()) -> RunOutcome {
        if self.is_done() {
            return RunOutcome::AlreadyDone;
        }

        let _guard = lock_unpoisoned(&self.run_lock);
        if self.is_done() {
            return RunOutcome::AlreadyDone;
        }

        let result = panic::catch_unwind(AssertUnwindSafe(call));
        self.done.store(true, Ordering::Release);

        match result {
            Ok(()) => RunOutcome::Completed,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!("{} panicked while running: {}", self.id, message);
                RunOutcome::Panicked(message)
            }
        }
    }

    /// Mark the task done without running it and pull it out of its queue.
    ///
    /// `on_cancel` runs under the task lock before the done flag is published,
    /// so anyone who observes `is_done()` also observes its effects.
    ///
    /// # Returns
    /// `true` if this call cancelled the task, `false` if it was already done
    pub fn cancel_with(&self, on_cancel: impl FnOnce()) -> bool {
        if self.is_done() {
            return false;
        }

        let _guard = lock_unpoisoned(&self.run_lock);
        if self.is_done() {
            return false;
        }

        on_cancel();
        self.done.store(true, Ordering::Release);

        // Take the reference first so the leaf lock is released before the
        // queue lock is acquired.
        let queue = lock_unpoisoned(&self.queue).take();
        if let Some(queue) = queue.and_then(|weak| weak.upgrade()) {
            if !queue.remove(self.id) {
                tracing::trace!("{} was no longer queued when cancelled", self.id);
            }
        }

        tracing::trace!("{} cancelled", self.id);
        true
    }
}

impl Default for TaskCore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCore")
            .field("id", &self.id)
            .field("done", &self.is_done())
            .finish()
    }
}

/// A unit of deferred work.
///
/// Implementors provide [`core()`](Self::core) and [`call()`](Self::call); the
/// remaining methods have the run-once/cancel semantics built in and are not
/// meant to be overridden.
pub trait Task: Send + Sync {
    /// Shared completion state
    fn core(&self) -> &TaskCore;

    /// The user work. Called at most once through [`run()`](Self::run).
    fn call(&self);

    /// Hook invoked under the task lock when the task is cancelled before running
    fn on_cancelled(&self) {}

    fn id(&self) -> TaskId {
        self.core().id()
    }

    /// Run the task unless it already ran or was cancelled
    fn run(&self) -> RunOutcome {
        self.core().run_once(|| self.call())
    }

    fn is_done(&self) -> bool {
        self.core().is_done()
    }

    /// Attach the back-reference used by [`cancel()`](Self::cancel)
    fn set_queue(&self, queue: &Arc<TaskQueue>) {
        self.core().attach(queue);
    }

    /// Cancel the task if it has not run yet. Never fails.
    ///
    /// # Returns
    /// `true` if this call cancelled the task
    fn cancel(&self) -> bool {
        self.core().cancel_with(|| self.on_cancelled())
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Task callbacks run under catch_unwind, so a poisoned lock only means a
/// panic was already reported; the protected state is still consistent.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
