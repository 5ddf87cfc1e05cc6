// Dispatch metrics module
//
// Lightweight counters describing how dispatchers are used and how busy they keep
// their execution contexts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by the dispatchers of one poster
///
/// Uses atomic operations for thread-safe tracking without locks. Producers
/// bump `tasks_enqueued` from any thread; everything else is recorded by the
/// drain on the consumer context.
#[derive(Debug)]
pub struct DispatchMetrics {
    /// Tasks accepted by `enqueue`
    pub tasks_enqueued: AtomicU64,

    /// Tasks that ran to completion, sync tasks included
    pub tasks_run: AtomicU64,

    /// Tasks whose callback panicked, whether or not a waiter received the panic
    pub task_panics: AtomicU64,

    /// Pending tasks cancelled by dispose or by a refused wake-up
    pub tasks_discarded: AtomicU64,

    /// Drain invocations, including ones that found an empty queue
    pub drains: AtomicU64,

    /// Drains that used up their budget and requested another wake-up
    pub rearms: AtomicU64,

    /// Successful wake requests issued by enqueue
    pub wakes: AtomicU64,

    /// Wake requests refused by the execution context
    pub wake_failures: AtomicU64,

    /// Time spent in drains that hit the budget, in milliseconds
    pub busy_time_ms: AtomicU64,

    start_time: Instant,
}

/// Plain copy of the counters at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub tasks_enqueued: u64,
    pub tasks_run: u64,
    pub task_panics: u64,
    pub tasks_discarded: u64,
    pub drains: u64,
    pub rearms: u64,
    pub wakes: u64,
    pub wake_failures: u64,
    pub busy_time_ms: u64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self {
            tasks_enqueued: AtomicU64::new(0),
            tasks_run: AtomicU64::new(0),
            task_panics: AtomicU64::new(0),
            tasks_discarded: AtomicU64::new(0),
            drains: AtomicU64::new(0),
            rearms: AtomicU64::new(0),
            wakes: AtomicU64::new(0),
            wake_failures: AtomicU64::new(0),
            busy_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_enqueued(&self) {
        self.tasks_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run(&self) {
        self.tasks_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.task_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.tasks_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drain(&self) {
        self.drains.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rearm(&self) {
        self.rearms.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wake(&self) {
        self.wakes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wake_failure(&self) {
        self.wake_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long a budget-limited drain held the context
    pub fn record_busy_time(&self, millis: u64) {
        self.busy_time_ms.fetch_add(millis, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average number of tasks executed per drain
    pub fn avg_tasks_per_drain(&self) -> f64 {
        let drains = self.drains.load(Ordering::Relaxed);
        let executed =
            self.tasks_run.load(Ordering::Relaxed) + self.task_panics.load(Ordering::Relaxed);
        if drains > 0 {
            executed as f64 / drains as f64
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_enqueued: self.tasks_enqueued.load(Ordering::Relaxed),
            tasks_run: self.tasks_run.load(Ordering::Relaxed),
            task_panics: self.task_panics.load(Ordering::Relaxed),
            tasks_discarded: self.tasks_discarded.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
            rearms: self.rearms.load(Ordering::Relaxed),
            wakes: self.wakes.load(Ordering::Relaxed),
            wake_failures: self.wake_failures.load(Ordering::Relaxed),
            busy_time_ms: self.busy_time_ms.load(Ordering::Relaxed),
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self, label: &str) {
        let snapshot = self.snapshot();
        tracing::info!("=== Dispatch Metrics: {} ===", label);
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Tasks: {} enqueued, {} run, {} panicked, {} discarded",
            snapshot.tasks_enqueued,
            snapshot.tasks_run,
            snapshot.task_panics,
            snapshot.tasks_discarded
        );
        tracing::info!(
            "Drains: {} (avg {:.2} tasks), {} re-armed, {}ms over budget slices",
            snapshot.drains,
            self.avg_tasks_per_drain(),
            snapshot.rearms,
            snapshot.busy_time_ms
        );
        tracing::info!(
            "Wakes: {}, failures: {}",
            snapshot.wakes,
            snapshot.wake_failures
        );
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}
