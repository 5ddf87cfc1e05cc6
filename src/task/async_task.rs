use super::{Task, TaskCore, lock_unpoisoned};
use std::fmt;
use std::sync::Mutex;

type Action = Box<dyn FnOnce() + Send + 'static>;

/// Fire-and-forget task wrapping a one-shot callback.
///
/// The caller keeps an `Arc<AsyncTask>` to observe or cancel the work; the
/// dispatcher queue holds the other reference until the task is drained.
pub struct AsyncTask {
    core: TaskCore,
    action: Mutex<Option<Action>>,
}

impl AsyncTask {
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            core: TaskCore::new(),
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// A task that is already done.
    ///
    /// Returned by the inline fast path, where the callback ran directly on the
    /// calling thread because it already was the target context.
    pub fn completed() -> Self {
        Self {
            core: TaskCore::completed(),
            action: Mutex::new(None),
        }
    }
}

impl Task for AsyncTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn call(&self) {
        // Once dispatched the queue reference is no longer needed
        self.core.detach();

        let action = lock_unpoisoned(&self.action).take();
        if let Some(action) = action {
            action();
        }
    }

    fn on_cancelled(&self) {
        // Release whatever the callback captured
        lock_unpoisoned(&self.action).take();
    }
}

impl fmt::Debug for AsyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTask")
            .field("id", &self.core.id())
            .field("done", &self.core.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::TaskQueue;
    use crate::task::RunOutcome;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_async_task_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let task = AsyncTask::new(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!task.is_done());
        assert_eq!(task.run(), RunOutcome::Completed);
        assert_eq!(task.run(), RunOutcome::AlreadyDone);

        assert!(task.is_done());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_completed_task_is_done() {
        let task = AsyncTask::completed();

        assert!(task.is_done());
        assert!(!task.cancel());
        assert_eq!(task.run(), RunOutcome::AlreadyDone);
    }

    #[test]
    fn test_call_clears_queue_reference() {
        let queue = Arc::new(TaskQueue::new());
        let task = AsyncTask::new(|| {});

        task.set_queue(&queue);
        assert!(task.core().is_attached());

        task.run();
        assert!(!task.core().is_attached());
    }

    #[test]
    fn test_cancel_drops_captured_state() {
        let captured = Arc::new(());
        let held = Arc::clone(&captured);
        let task = AsyncTask::new(move || {
            let _keep = &held;
        });

        assert_eq!(Arc::strong_count(&captured), 2);
        assert!(task.cancel());
        assert_eq!(Arc::strong_count(&captured), 1);
    }

    #[test]
    fn test_panicking_action_marks_done() {
        let task = AsyncTask::new(|| panic!("async failure"));

        assert_eq!(
            task.run(),
            RunOutcome::Panicked("async failure".to_string())
        );
        assert!(task.is_done());
    }
}
