// PumpedLooper - an execution context driven by the thread that owns it
//
// Hosts that already have a main loop (a UI toolkit, a game frame loop) can't
// hand their thread to a ThreadLooper. Instead they create a PumpedLooper on
// that thread and call `pump()` once per iteration of their own loop.

use super::{Callback, ContextError, ExecutionContext};
use crate::task::{lock_unpoisoned, panic_message};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::{self, ThreadId};
use tokio::sync::mpsc;

/// Execution context pumped explicitly by its owning thread.
///
/// The owner is the thread that called [`new()`](Self::new); only that thread
/// may pump. Callbacks posted while a pump is in progress (for instance a
/// drain re-arming itself) are left for a later pump when `max` is reached,
/// which is what lets other work on the owner's loop interleave.
pub struct PumpedLooper {
    tx: mpsc::UnboundedSender<Callback>,
    rx: Mutex<mpsc::UnboundedReceiver<Callback>>,
    owner: ThreadId,
}

impl PumpedLooper {
    /// Create a looper owned by the calling thread
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            owner: thread::current().id(),
        }
    }

    /// Run at most `max` queued callbacks.
    ///
    /// # Returns
    /// The number of callbacks that ran
    ///
    /// # Errors
    /// [`ContextError::NotOwner`] if called from a thread other than the owner;
    /// nothing runs in that case.
    pub fn pump(&self, max: usize) -> Result<usize, ContextError> {
        if !self.is_current() {
            tracing::error!("PumpedLooper::pump called off its owning thread");
            return Err(ContextError::NotOwner);
        }

        let mut ran = 0;
        while ran < max {
            // Take one callback and release the receiver before running it,
            // so the callback may post back into this looper.
            let next = lock_unpoisoned(&self.rx).try_recv().ok();
            let Some(callback) = next else {
                break;
            };

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
                tracing::error!(
                    "Callback panicked on pumped looper: {}",
                    panic_message(payload.as_ref())
                );
            }
            ran += 1;
        }
        Ok(ran)
    }

    /// Pump until no callback is queued, including ones posted while pumping.
    ///
    /// # Returns
    /// The number of callbacks that ran
    ///
    /// # Errors
    /// [`ContextError::NotOwner`] off the owning thread, as for [`pump()`](Self::pump)
    pub fn run_until_idle(&self) -> Result<usize, ContextError> {
        let mut total = 0;
        loop {
            let ran = self.pump(usize::MAX)?;
            if ran == 0 {
                return Ok(total);
            }
            total += ran;
        }
    }

    /// Whether any callback is waiting to be pumped
    pub fn has_pending(&self) -> bool {
        !lock_unpoisoned(&self.rx).is_empty()
    }
}

impl Default for PumpedLooper {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext for PumpedLooper {
    fn post(&self, callback: Callback) -> Result<(), ContextError> {
        self.tx.send(callback).map_err(|_| ContextError::Closed)
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }
}
