use super::{DispatchError, DispatchTag, Dispatcher, DrainOutcome, WakeHandle};
use crate::clock::{Clock, MonotonicClock};
use crate::context::{ContextError, ExecutionContext};
use crate::metrics::DispatchMetrics;
use crate::models::PosterSettings;
use crate::task::{AsyncTask, SyncTask, Task, TaskError, panic_message};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Default drain budget for a poster on a latency-sensitive context
pub const DEFAULT_BUDGET_MS: u64 = 16;

/// How to build a [`Poster`]
#[derive(Clone)]
pub struct PosterOptions {
    /// Label used in log messages
    pub name: String,

    /// Milliseconds a single drain may occupy the context
    pub budget_ms: u64,

    /// Route sync tasks through the async dispatcher, sharing one FIFO
    pub only_async: bool,

    pub clock: Arc<dyn Clock>,
}

impl PosterOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_settings(name: impl Into<String>, settings: &PosterSettings) -> Self {
        Self {
            name: name.into(),
            budget_ms: settings.budget_ms,
            only_async: settings.only_async,
            ..Self::default()
        }
    }

    pub fn with_budget(mut self, budget_ms: u64) -> Self {
        self.budget_ms = budget_ms;
        self
    }

    pub fn with_only_async(mut self, only_async: bool) -> Self {
        self.only_async = only_async;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for PosterOptions {
    fn default() -> Self {
        Self {
            name: "poster".to_string(),
            budget_ms: DEFAULT_BUDGET_MS,
            only_async: false,
            clock: Arc::new(MonotonicClock::new()),
        }
    }
}

impl fmt::Debug for PosterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PosterOptions")
            .field("name", &self.name)
            .field("budget_ms", &self.budget_ms)
            .field("only_async", &self.only_async)
            .finish()
    }
}

/// Wake handle that posts a tagged drain request onto the poster's context
struct TaggedWake {
    tag: DispatchTag,
    poster: Weak<PosterInner>,
    context: Arc<dyn ExecutionContext>,
}

impl WakeHandle for TaggedWake {
    fn wake(&self) -> Result<(), ContextError> {
        let tag = self.tag;
        let poster = self.poster.clone();
        self.context.post(Box::new(move || {
            // The poster may be gone by the time the context gets to us
            if let Some(poster) = poster.upgrade() {
                poster.handle_message(tag);
            }
        }))
    }
}

struct PosterInner {
    name: String,
    async_dispatcher: Arc<Dispatcher>,
    sync_dispatcher: Arc<Dispatcher>,
    context: Arc<dyn ExecutionContext>,
    disposed: AtomicBool,
    metrics: Arc<DispatchMetrics>,
    budget_ms: u64,
}

impl PosterInner {
    fn handle_message(&self, tag: DispatchTag) -> Option<DrainOutcome> {
        if self.disposed.load(Ordering::Acquire) {
            tracing::trace!("{}: ignoring {} wake-up after dispose", self.name, tag);
            return None;
        }

        let outcome = match tag {
            DispatchTag::Async => self.async_dispatcher.drain(),
            DispatchTag::Sync => self.sync_dispatcher.drain(),
        };
        Some(outcome)
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.async_dispatcher.dispose();
        if !Arc::ptr_eq(&self.async_dispatcher, &self.sync_dispatcher) {
            self.sync_dispatcher.dispose();
        }

        tracing::debug!("{}: poster disposed", self.name);
    }
}

impl Drop for PosterInner {
    fn drop(&mut self) {
        // Release any thread still blocked on a sync task
        self.dispose();
    }
}

/// Posts tasks onto a single-threaded execution context.
///
/// A poster owns an async and a sync [`Dispatcher`] that share one context and
/// one wake signal; each wake-up carries a [`DispatchTag`] so the context can
/// route it to the right drain. With `only_async` both kinds of task go through
/// the same dispatcher and keep their relative order.
///
/// Cloning a poster is cheap and yields a handle to the same dispatchers.
///
/// # Example
/// ```ignore
/// let looper: Arc<dyn ExecutionContext> = Arc::new(ThreadLooper::spawn("worker")?);
/// let poster = Poster::new(looper, PosterOptions::new("worker"));
///
/// poster.run_async(|| tracing::info!("fire and forget"))?;
/// let answer = poster.run_sync(|| 6 * 7)?;
/// ```
#[derive(Clone)]
pub struct Poster {
    inner: Arc<PosterInner>,
}

impl Poster {
    /// Create a poster draining on `context`
    ///
    /// # Arguments
    /// * `context` - The single-threaded context tasks will run on
    /// * `options` - Name, budget, aliasing and clock
    pub fn new(context: Arc<dyn ExecutionContext>, options: PosterOptions) -> Self {
        let PosterOptions {
            name,
            budget_ms,
            only_async,
            clock,
        } = options;
        let metrics = Arc::new(DispatchMetrics::new());

        let inner = Arc::new_cyclic(|weak: &Weak<PosterInner>| {
            let make_dispatcher = |tag: DispatchTag| {
                let waker = Arc::new(TaggedWake {
                    tag,
                    poster: weak.clone(),
                    context: Arc::clone(&context),
                });
                Arc::new(Dispatcher::with_parts(
                    format!("{}/{}", name, tag),
                    waker,
                    budget_ms,
                    Arc::clone(&clock),
                    Arc::clone(&metrics),
                ))
            };

            let async_dispatcher = make_dispatcher(DispatchTag::Async);
            let sync_dispatcher = if only_async {
                Arc::clone(&async_dispatcher)
            } else {
                make_dispatcher(DispatchTag::Sync)
            };

            PosterInner {
                name: name.clone(),
                async_dispatcher,
                sync_dispatcher,
                context: Arc::clone(&context),
                disposed: AtomicBool::new(false),
                metrics: Arc::clone(&metrics),
                budget_ms,
            }
        });

        tracing::debug!(
            "{}: poster created (budget {}ms, only_async: {})",
            inner.name,
            budget_ms,
            only_async
        );

        Self { inner }
    }

    /// Queue a fire-and-forget task
    ///
    /// # Errors
    /// [`DispatchError::Disposed`] once the poster has been disposed, or
    /// [`DispatchError::Wake`] if the context is gone. The task is cancelled
    /// in both cases and never runs.
    pub fn post_async(&self, task: Arc<dyn Task>) -> Result<(), DispatchError> {
        self.post_to(&self.inner.async_dispatcher, task)
    }

    /// Queue a task on the sync dispatcher. The caller is expected to wait on it.
    pub fn post_sync(&self, task: Arc<dyn Task>) -> Result<(), DispatchError> {
        self.post_to(&self.inner.sync_dispatcher, task)
    }

    fn post_to(&self, dispatcher: &Dispatcher, task: Arc<dyn Task>) -> Result<(), DispatchError> {
        if self.is_disposed() {
            task.cancel();
            tracing::warn!("{}: {} posted after dispose", self.inner.name, task.id());
            return Err(DispatchError::Disposed);
        }
        dispatcher.enqueue(task)
    }

    /// Context entry point: drain the dispatcher a wake-up was tagged for.
    ///
    /// Returns `None` when the poster has been disposed.
    pub fn handle_message(&self, tag: DispatchTag) -> Option<DrainOutcome> {
        self.inner.handle_message(tag)
    }

    /// Discard all pending tasks and stop accepting new ones.
    ///
    /// Threads blocked on a pending sync task are released with
    /// [`TaskError::Cancelled`]. Calling this more than once is harmless.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Whether the calling thread is the poster's context
    pub fn is_current(&self) -> bool {
        self.inner.context.is_current()
    }

    /// Run `action` on the context without waiting for it.
    ///
    /// When already on the context the action runs inline and an already
    /// completed task is returned.
    pub fn run_async<F>(&self, action: F) -> Result<Arc<AsyncTask>, DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_current() && !self.is_disposed() {
            action();
            return Ok(Arc::new(AsyncTask::completed()));
        }

        let task = Arc::new(AsyncTask::new(action));
        self.post_async(task.clone())?;
        Ok(task)
    }

    /// Run `func` on the context and block until it has produced its value.
    ///
    /// Runs inline when already on the context, since waiting there would
    /// never finish.
    pub fn run_sync<T, F>(&self, func: F) -> Result<T, TaskError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.is_current() && !self.is_disposed() {
            return run_inline(func);
        }

        let task = Arc::new(SyncTask::new(func));
        self.post_sync(task.clone())?;
        task.wait()
    }

    /// Like [`run_sync()`](Self::run_sync) but gives up after `timeout`,
    /// optionally cancelling the task if it has not started.
    pub fn run_sync_timeout<T, F>(
        &self,
        func: F,
        timeout: Duration,
        cancel_on_timeout: bool,
    ) -> Result<T, TaskError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.is_current() && !self.is_disposed() {
            return run_inline(func);
        }

        let task = Arc::new(SyncTask::new(func));
        self.post_sync(task.clone())?;
        task.wait_timeout(timeout, cancel_on_timeout)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.inner.metrics
    }

    /// Drain budget in milliseconds
    pub fn budget_ms(&self) -> u64 {
        self.inner.budget_ms
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.inner.budget_ms)
    }

    /// Whether sync tasks share the async FIFO
    pub fn is_sync_aliased(&self) -> bool {
        Arc::ptr_eq(&self.inner.async_dispatcher, &self.inner.sync_dispatcher)
    }

    pub fn async_dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.async_dispatcher
    }

    pub fn sync_dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.sync_dispatcher
    }

    /// Tasks waiting in either dispatcher
    pub fn pending(&self) -> usize {
        let pending = self.inner.async_dispatcher.pending();
        if self.is_sync_aliased() {
            pending
        } else {
            pending + self.inner.sync_dispatcher.pending()
        }
    }
}

impl fmt::Debug for Poster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poster")
            .field("name", &self.inner.name)
            .field("budget_ms", &self.inner.budget_ms)
            .field("aliased", &self.is_sync_aliased())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Inline counterpart of a sync task: a panic becomes the waiter's error
fn run_inline<T, F>(func: F) -> Result<T, TaskError>
where
    F: FnOnce() -> T,
{
    panic::catch_unwind(AssertUnwindSafe(func))
        .map_err(|payload| TaskError::Panicked(panic_message(payload.as_ref())))
}
