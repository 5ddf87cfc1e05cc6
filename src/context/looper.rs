// ThreadLooper - a dedicated thread that runs posted callbacks in order
//
// Callbacks travel over an unbounded tokio channel and are consumed with
// `blocking_recv` on a plain std thread, so the looper can be used with or
// without a tokio runtime in the process.

use super::{Callback, ContextError, ExecutionContext};
use crate::task::{lock_unpoisoned, panic_message};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::mpsc;

/// Execution context backed by its own named thread.
///
/// The thread lives until [`quit()`](Self::quit) is called or the looper is
/// dropped. Callbacks already queued at that point still run before the thread
/// exits.
///
/// # Example
/// ```ignore
/// let looper = ThreadLooper::spawn("worker")?;
/// looper.post(Box::new(|| tracing::info!("on the looper")))?;
/// looper.quit();
/// ```
pub struct ThreadLooper {
    name: String,

    /// Sender side of the callback channel; `None` once the looper has quit
    tx: Mutex<Option<mpsc::UnboundedSender<Callback>>>,

    /// Join handle for the loop thread, taken on quit
    handle: Mutex<Option<JoinHandle<()>>>,

    thread_id: ThreadId,
}

impl ThreadLooper {
    /// Spawn a looper thread with the given name
    pub fn spawn(name: impl Into<String>) -> Result<Self, ContextError> {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Callback>();

        let loop_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            tracing::debug!("Looper thread {} started", loop_name);

            while let Some(callback) = rx.blocking_recv() {
                // A panicking callback must not take the whole loop down with it
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
                    tracing::error!(
                        "Callback panicked on looper {}: {}",
                        loop_name,
                        panic_message(payload.as_ref())
                    );
                }
            }

            tracing::debug!("Looper thread {} terminated", loop_name);
        })?;

        let thread_id = handle.thread().id();

        Ok(Self {
            name,
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            thread_id,
        })
    }

    /// Name of the looper thread
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the looper still accepts callbacks
    pub fn is_running(&self) -> bool {
        lock_unpoisoned(&self.tx)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Stop accepting callbacks and wait for the queued ones to finish.
    ///
    /// Calling `quit` from the looper thread itself only closes the channel;
    /// the thread exits once the current callback returns.
    pub fn quit(&self) {
        let tx = lock_unpoisoned(&self.tx).take();
        if tx.is_none() {
            return;
        }
        drop(tx);

        if self.is_current() {
            return;
        }

        if let Some(handle) = lock_unpoisoned(&self.handle).take() {
            if handle.join().is_err() {
                tracing::warn!("Looper thread {} exited abnormally", self.name);
            }
        }
    }
}

impl ExecutionContext for ThreadLooper {
    fn post(&self, callback: Callback) -> Result<(), ContextError> {
        let guard = lock_unpoisoned(&self.tx);
        let tx = guard.as_ref().ok_or(ContextError::Closed)?;
        tx.send(callback).map_err(|_| ContextError::Closed)
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for ThreadLooper {
    fn drop(&mut self) {
        self.quit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    #[test]
    fn test_callbacks_run_in_order_on_looper_thread() {
        let looper = ThreadLooper::spawn("test-looper").unwrap();
        let (tx, rx) = std_mpsc::channel();

        for i in 0..5 {
            let tx = tx.clone();
            looper
                .post(Box::new(move || {
                    let name = thread::current().name().map(str::to_string);
                    tx.send((i, name)).unwrap();
                }))
                .unwrap();
        }

        for expected in 0..5 {
            let (i, name) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
            assert_eq!(i, expected);
            assert_eq!(name.as_deref(), Some("test-looper"));
        }
    }

    #[test]
    fn test_is_current_only_on_looper_thread() {
        let looper = Arc::new(ThreadLooper::spawn("affinity").unwrap());
        assert!(!looper.is_current());

        let (tx, rx) = std_mpsc::channel();
        let inner = Arc::clone(&looper);
        looper
            .post(Box::new(move || {
                tx.send(inner.is_current()).unwrap();
            }))
            .unwrap();

        assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn test_post_after_quit_fails() {
        let looper = ThreadLooper::spawn("quitter").unwrap();
        assert!(looper.is_running());

        looper.quit();

        assert!(!looper.is_running());
        assert!(matches!(
            looper.post(Box::new(|| {})),
            Err(ContextError::Closed)
        ));
    }

    #[test]
    fn test_quit_drains_queued_callbacks() {
        let looper = ThreadLooper::spawn("drainer").unwrap();
        let (tx, rx) = std_mpsc::channel();

        for i in 0..3 {
            let tx = tx.clone();
            looper
                .post(Box::new(move || {
                    thread::sleep(Duration::from_millis(5));
                    tx.send(i).unwrap();
                }))
                .unwrap();
        }

        looper.quit();

        let received: Vec<i32> = rx.try_iter().collect();
        assert_eq!(received, vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_callback_keeps_loop_alive() {
        let looper = ThreadLooper::spawn("survivor").unwrap();
        let (tx, rx) = std_mpsc::channel();

        looper.post(Box::new(|| panic!("boom"))).unwrap();
        looper
            .post(Box::new(move || {
                tx.send("still alive").unwrap();
            }))
            .unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            "still alive"
        );
    }
}
