use super::WakeHandle;
use crate::task::{Task, TaskId, lock_unpoisoned};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Everything a dispatcher mutates, guarded by a single lock
pub(crate) struct QueueState {
    pub(crate) tasks: VecDeque<Arc<dyn Task>>,

    /// True while a drain is scheduled or running
    pub(crate) active: bool,

    /// Wake capability; dropped on dispose
    pub(crate) waker: Option<Arc<dyn WakeHandle>>,

    pub(crate) disposed: bool,
}

/// FIFO of pending tasks shared between a dispatcher and the tasks it holds.
///
/// The dispatcher owns the queue through an `Arc`; tasks only keep a `Weak`
/// back-reference so they can remove themselves on cancel.
pub struct TaskQueue {
    state: Mutex<QueueState>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::with_waker(None)
    }

    pub(crate) fn with_waker(waker: Option<Arc<dyn WakeHandle>>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                active: false,
                waker,
                disposed: false,
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
        lock_unpoisoned(&self.state)
    }

    /// Remove the task with `id` if it is still queued.
    ///
    /// # Returns
    /// `true` if the task was found and removed
    pub fn remove(&self, id: TaskId) -> bool {
        let mut state = self.lock();
        match state.tasks.iter().position(|task| task.id() == id) {
            Some(index) => {
                state.tasks.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }

    /// Ids of the queued tasks, head first
    pub fn snapshot_ids(&self) -> Vec<TaskId> {
        self.lock().tasks.iter().map(|task| task.id()).collect()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
