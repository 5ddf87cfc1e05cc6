use super::{Task, TaskCore, TaskError, lock_unpoisoned, panic_message};
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

type Func<T> = Box<dyn FnOnce() -> T + Send + 'static>;

/// Result slot handed from the consumer thread to the waiting thread
enum Slot<T> {
    Pending,
    Ready(Result<T, TaskError>),
    Taken,
}

impl<T> Slot<T> {
    fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending)
    }

    /// Move the outcome out, leaving `Taken` behind. `None` while still pending.
    fn take(&mut self) -> Option<Result<T, TaskError>> {
        match mem::replace(self, Slot::Taken) {
            Slot::Pending => {
                *self = Slot::Pending;
                None
            }
            Slot::Ready(result) => Some(result),
            Slot::Taken => Some(Err(TaskError::ResultTaken)),
        }
    }
}

/// Task whose caller blocks until the consumer has run it.
///
/// `SyncTask<()>` wraps a plain action; `SyncTask<T>` computes a value that is
/// handed back to the waiter. A panic inside the callback is handed to the
/// waiter as [`TaskError::Panicked`] and reported by [`Task::run`] as
/// [`RunOutcome::Panicked`](super::RunOutcome::Panicked); it never unwinds
/// through the consumer's drain.
///
/// # Example
/// ```ignore
/// let task = Arc::new(SyncTask::new(|| 6 * 7));
/// poster.post_sync(task.clone())?;
/// assert_eq!(task.wait()?, 42);
/// ```
pub struct SyncTask<T = ()> {
    core: TaskCore,
    func: Mutex<Option<Func<T>>>,
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

/// Value-returning flavour of [`SyncTask`]
pub type ValueSyncTask<T> = SyncTask<T>;

impl<T: Send + 'static> SyncTask<T> {
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self {
            core: TaskCore::new(),
            func: Mutex::new(Some(Box::new(func))),
            slot: Mutex::new(Slot::Pending),
            ready: Condvar::new(),
        }
    }

    /// Block until the task has run or been cancelled.
    ///
    /// # Returns
    /// The callback's value, [`TaskError::Panicked`] if it panicked, or
    /// [`TaskError::Cancelled`] if it was cancelled before running
    pub fn wait(&self) -> Result<T, TaskError> {
        let slot = lock_unpoisoned(&self.slot);
        let mut slot = self
            .ready
            .wait_while(slot, |slot| slot.is_pending())
            .unwrap_or_else(PoisonError::into_inner);

        slot.take().unwrap_or(Err(TaskError::Cancelled))
    }

    /// Block for at most `timeout`.
    ///
    /// If the task has not completed by then and `cancel_on_timeout` is set,
    /// the task is cancelled. Cancellation is best-effort: when the consumer
    /// had already started the task, cancelling waits for it to finish and the
    /// value it produced is returned after all.
    ///
    /// # Returns
    /// The value if it became available, otherwise
    /// [`TaskError::TimedOut`] telling whether the task was cancelled
    pub fn wait_timeout(&self, timeout: Duration, cancel_on_timeout: bool) -> Result<T, TaskError> {
        {
            let slot = lock_unpoisoned(&self.slot);
            let (mut slot, _) = self
                .ready
                .wait_timeout_while(slot, timeout, |slot| slot.is_pending())
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(result) = slot.take() {
                return result;
            }
        }

        let cancelled = cancel_on_timeout && self.cancel();
        if cancelled {
            tracing::debug!("{} cancelled after waiting {:?}", self.core.id(), timeout);
        }

        let mut slot = lock_unpoisoned(&self.slot);
        match slot.take() {
            Some(Err(TaskError::Cancelled)) if cancelled => Err(TaskError::TimedOut { cancelled: true }),
            Some(result) => result,
            None => Err(TaskError::TimedOut { cancelled: false }),
        }
    }

    /// Whether a result (or error) is waiting to be taken
    pub fn has_result(&self) -> bool {
        matches!(*lock_unpoisoned(&self.slot), Slot::Ready(_))
    }

    fn complete(&self, result: Result<T, TaskError>) {
        let mut slot = lock_unpoisoned(&self.slot);
        if slot.is_pending() {
            *slot = Slot::Ready(result);
        }
        self.ready.notify_all();
    }
}

impl<T: Send + 'static> Task for SyncTask<T> {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn call(&self) {
        self.core.detach();

        let func = lock_unpoisoned(&self.func).take();
        let Some(func) = func else {
            return;
        };

        match panic::catch_unwind(AssertUnwindSafe(func)) {
            Ok(value) => self.complete(Ok(value)),
            Err(payload) => {
                // The waiter gets the error first; the unwind then reaches
                // run() so the drain reports the task as panicked.
                self.complete(Err(TaskError::Panicked(panic_message(payload.as_ref()))));
                panic::resume_unwind(payload);
            }
        }
    }

    fn on_cancelled(&self) {
        lock_unpoisoned(&self.func).take();
        self.complete(Err(TaskError::Cancelled));
    }
}

impl<T> fmt::Debug for SyncTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTask")
            .field("id", &self.core.id())
            .field("done", &self.core.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::RunOutcome;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_wait_returns_value_from_other_thread() {
        let task = Arc::new(SyncTask::new(|| 6 * 7));

        let runner = Arc::clone(&task);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            runner.run()
        });

        assert_eq!(task.wait().unwrap(), 42);
        assert_eq!(handle.join().unwrap(), RunOutcome::Completed);
    }

    #[test]
    fn test_panic_is_reraised_to_waiter() {
        let task: SyncTask<u32> = SyncTask::new(|| panic!("bad input"));

        // The panic never escapes run(), but run() reports it
        assert_eq!(task.run(), RunOutcome::Panicked("bad input".to_string()));
        assert!(task.is_done());

        match task.wait() {
            Err(TaskError::Panicked(message)) => assert_eq!(message, "bad input"),
            other => panic!("expected Panicked, got {:?}", other),
        }
    }

    #[test]
    fn test_result_can_only_be_taken_once() {
        let task = SyncTask::new(|| "once".to_string());
        task.run();

        assert!(task.has_result());
        assert_eq!(task.wait().unwrap(), "once");
        assert!(matches!(task.wait(), Err(TaskError::ResultTaken)));
    }

    #[test]
    fn test_cancel_releases_waiter() {
        let task = Arc::new(SyncTask::new(|| ()));

        let canceller = Arc::clone(&task);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            canceller.cancel()
        });

        assert!(matches!(task.wait(), Err(TaskError::Cancelled)));
        assert!(handle.join().unwrap());
        assert!(task.is_done());
    }

    #[test]
    fn test_timeout_with_cancel() {
        let task = SyncTask::new(|| 1);
        let start = Instant::now();

        let result = task.wait_timeout(Duration::from_millis(50), true);

        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(matches!(result, Err(TaskError::TimedOut { cancelled: true })));
        assert!(task.is_done());
        assert_eq!(task.run(), RunOutcome::AlreadyDone);
    }

    #[test]
    fn test_timeout_without_cancel_leaves_task_runnable() {
        let task = SyncTask::new(|| 5);

        let result = task.wait_timeout(Duration::from_millis(10), false);
        assert!(matches!(result, Err(TaskError::TimedOut { cancelled: false })));
        assert!(!task.is_done());

        task.run();
        assert_eq!(task.wait().unwrap(), 5);
    }

    #[test]
    fn test_timeout_honors_result_of_running_task() {
        let task = Arc::new(SyncTask::new(|| {
            thread::sleep(Duration::from_millis(60));
            "finished"
        }));

        let runner = Arc::clone(&task);
        let handle = thread::spawn(move || runner.run());

        // Give the runner time to take the task lock before we time out
        thread::sleep(Duration::from_millis(10));
        let result = task.wait_timeout(Duration::from_millis(10), true);

        assert_eq!(result.unwrap(), "finished");
        assert_eq!(handle.join().unwrap(), RunOutcome::Completed);
    }

    #[test]
    fn test_sub_millisecond_timeout() {
        let task = SyncTask::new(|| ());
        let timeout = Duration::from_millis(1) + Duration::from_nanos(500_000);

        let result = task.wait_timeout(timeout, true);
        assert!(matches!(result, Err(TaskError::TimedOut { cancelled: true })));
    }
}
