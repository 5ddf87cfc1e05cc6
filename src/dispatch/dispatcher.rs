use super::{DispatchError, TaskQueue, WakeHandle};
use crate::clock::{Clock, MonotonicClock};
use crate::metrics::DispatchMetrics;
use crate::task::{RunOutcome, Task};
use std::mem;
use std::sync::Arc;

/// How a call to [`Dispatcher::drain`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The queue ran dry and the dispatcher went idle
    Idle { ran: usize },

    /// The time budget was used up; another drain has been requested
    Rearmed { ran: usize },

    /// The budget was used up but the context refused the wake-up.
    /// The dispatcher went idle with tasks still queued.
    WakeFailed { ran: usize },
}

impl DrainOutcome {
    /// Number of tasks executed during the drain
    pub fn ran(&self) -> usize {
        match *self {
            DrainOutcome::Idle { ran }
            | DrainOutcome::Rearmed { ran }
            | DrainOutcome::WakeFailed { ran } => ran,
        }
    }
}

/// FIFO work queue drained in time-bounded slices.
///
/// The dispatcher is either *idle* (nothing queued, no drain scheduled) or
/// *active* (a drain is scheduled or running). Only the idle→active transition
/// requests a wake-up, so at most one drain is outstanding at any time.
///
/// # Thread Safety
///
/// [`enqueue()`](Self::enqueue) may be called from any number of threads.
/// [`drain()`](Self::drain) must only be called from the dispatcher's execution
/// context, one call at a time.
pub struct Dispatcher {
    name: String,
    queue: Arc<TaskQueue>,
    clock: Arc<dyn Clock>,
    budget_ms: u64,
    metrics: Arc<DispatchMetrics>,
}

impl Dispatcher {
    /// Create a dispatcher with a wall clock and its own metrics
    ///
    /// # Arguments
    /// * `name` - Label used in log messages
    /// * `waker` - Capability that schedules a future `drain()` on the context
    /// * `budget_ms` - Time a single drain may occupy the context before yielding
    pub fn new(name: impl Into<String>, waker: Arc<dyn WakeHandle>, budget_ms: u64) -> Self {
        Self::with_parts(
            name,
            waker,
            budget_ms,
            Arc::new(MonotonicClock::new()),
            Arc::new(DispatchMetrics::new()),
        )
    }

    /// Create a dispatcher with an explicit clock and shared metrics
    pub fn with_parts(
        name: impl Into<String>,
        waker: Arc<dyn WakeHandle>,
        budget_ms: u64,
        clock: Arc<dyn Clock>,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        Self {
            name: name.into(),
            queue: Arc::new(TaskQueue::with_waker(Some(waker))),
            clock,
            budget_ms,
            metrics,
        }
    }

    /// Append a task and make sure a drain will pick it up.
    ///
    /// Tasks that are already done are ignored.
    ///
    /// # Errors
    /// - [`DispatchError::Disposed`] after [`dispose()`](Self::dispose); the
    ///   task is cancelled
    /// - [`DispatchError::Wake`] if the context refused the wake-up; the task
    ///   is cancelled and the dispatcher returns to idle so the next enqueue
    ///   retries the wake-up
    pub fn enqueue(&self, task: Arc<dyn Task>) -> Result<(), DispatchError> {
        if task.is_done() {
            tracing::trace!("{}: {} already done, not queued", self.name, task.id());
            return Ok(());
        }

        let waker = {
            let mut state = self.queue.lock();
            if state.disposed {
                drop(state);
                task.cancel();
                tracing::warn!("{}: {} posted after dispose", self.name, task.id());
                return Err(DispatchError::Disposed);
            }

            state.tasks.push_back(Arc::clone(&task));
            task.set_queue(&self.queue);
            self.metrics.record_enqueued();

            if state.active {
                None
            } else {
                state.active = true;
                state.waker.clone()
            }
        };

        tracing::trace!("{}: queued {}", self.name, task.id());

        // Only the producer that flipped idle -> active gets here, so the wake
        // can be issued outside the lock without a second one racing it.
        if let Some(waker) = waker {
            if let Err(err) = waker.wake() {
                self.queue.lock().active = false;
                self.metrics.record_wake_failure();
                tracing::error!("{}: failed to request drain: {}", self.name, err);

                // No drain is scheduled while we hold the idle -> active flip,
                // so the task cannot have started; pull it back out.
                if task.cancel() {
                    self.metrics.record_discarded();
                }
                return Err(DispatchError::Wake(err));
            }
            self.metrics.record_wake();
        }

        Ok(())
    }

    /// Run queued tasks until the queue is empty or the budget is used up.
    ///
    /// A task is never interrupted; the budget is checked between tasks, so a
    /// slice overruns it by at most the duration of its last task.
    pub fn drain(&self) -> DrainOutcome {
        let started = self.clock.now_millis();
        let mut ran = 0;
        self.metrics.record_drain();

        loop {
            // Popping and going idle happen in one critical section, so a
            // producer racing us either lands in this drain or sees idle and wakes.
            let task = {
                let mut state = self.queue.lock();
                match state.tasks.pop_front() {
                    Some(task) => task,
                    None => {
                        state.active = false;
                        tracing::trace!("{}: drained {} task(s), going idle", self.name, ran);
                        return DrainOutcome::Idle { ran };
                    }
                }
            };

            match task.run() {
                RunOutcome::Completed => {
                    self.metrics.record_run();
                    ran += 1;
                }
                RunOutcome::Panicked(_) => {
                    self.metrics.record_panic();
                    ran += 1;
                }
                RunOutcome::AlreadyDone => {}
            }

            let elapsed = self.clock.now_millis().saturating_sub(started);
            if elapsed >= self.budget_ms {
                self.metrics.record_busy_time(elapsed);
                return self.rearm(ran, elapsed);
            }
        }
    }

    /// Yield the context after the budget ran out
    fn rearm(&self, ran: usize, elapsed: u64) -> DrainOutcome {
        let waker = {
            let mut state = self.queue.lock();
            if state.tasks.is_empty() || state.waker.is_none() {
                state.active = false;
                return DrainOutcome::Idle { ran };
            }
            state.waker.clone()
        };

        tracing::debug!(
            "{}: budget of {}ms used ({}ms, {} task(s)), re-arming",
            self.name,
            self.budget_ms,
            elapsed,
            ran
        );

        let Some(waker) = waker else {
            return DrainOutcome::Idle { ran };
        };

        match waker.wake() {
            Ok(()) => {
                self.metrics.record_rearm();
                DrainOutcome::Rearmed { ran }
            }
            Err(err) => {
                self.queue.lock().active = false;
                self.metrics.record_wake_failure();
                tracing::error!(
                    "{}: failed to re-arm drain, {} task(s) left queued: {}",
                    self.name,
                    self.queue.len(),
                    err
                );
                DrainOutcome::WakeFailed { ran }
            }
        }
    }

    /// Discard all pending tasks and drop the wake capability.
    ///
    /// Discarded tasks are cancelled so that threads blocked on a
    /// [`SyncTask`](crate::task::SyncTask) are released. A wake-up that was
    /// already in flight finds an empty queue and does nothing. Disposing twice
    /// is a no-op.
    pub fn dispose(&self) {
        let pending = {
            let mut state = self.queue.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.active = false;
            state.waker = None;
            mem::take(&mut state.tasks)
        };

        // Cancel outside the queue lock: cancel takes the task lock and then
        // tries the queue lock itself.
        let discarded = pending.len();
        for task in pending {
            if task.cancel() {
                self.metrics.record_discarded();
            }
        }

        tracing::debug!("{}: disposed, {} pending task(s) discarded", self.name, discarded);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a drain is scheduled or running
    pub fn is_active(&self) -> bool {
        self.queue.lock().active
    }

    pub fn is_disposed(&self) -> bool {
        self.queue.lock().disposed
    }

    /// Number of queued tasks
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn budget_ms(&self) -> u64 {
        self.budget_ms
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }
}
