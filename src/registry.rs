// PosterRegistry - owner of the process-level UI and background posters
//
// Both posters are created lazily on first use, under a lock, and can be torn
// down together with `dispose()`. A later accessor call builds fresh ones.

use crate::context::{ContextError, ExecutionContext, ThreadLooper};
use crate::dispatch::{DispatchError, Poster, PosterOptions};
use crate::models::RunSettings;
use crate::task::{AsyncTask, TaskError, lock_unpoisoned};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Background {
    looper: Arc<ThreadLooper>,
    poster: Poster,
}

/// Lazily created posters for the host's UI thread and a background thread.
///
/// The UI context is supplied by the host (usually a
/// [`PumpedLooper`](crate::context::PumpedLooper) created on its main thread).
/// The background poster gets a dedicated [`ThreadLooper`].
///
/// # Example
/// ```ignore
/// let ui = Arc::new(PumpedLooper::new());
/// let registry = PosterRegistry::new(settings, ui.clone());
///
/// registry.on_background(|| tracing::info!("off the main thread"))?;
/// ui.run_until_idle()?;
/// registry.dispose();
/// ```
pub struct PosterRegistry {
    settings: RunSettings,
    ui_context: Arc<dyn ExecutionContext>,
    ui: Mutex<Option<Poster>>,
    background: Mutex<Option<Background>>,
}

impl PosterRegistry {
    pub fn new(settings: RunSettings, ui_context: Arc<dyn ExecutionContext>) -> Self {
        Self {
            settings,
            ui_context,
            ui: Mutex::new(None),
            background: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// The UI poster, created on first call
    pub fn ui_poster(&self) -> Poster {
        let mut ui = lock_unpoisoned(&self.ui);
        ui.get_or_insert_with(|| {
            Poster::new(
                Arc::clone(&self.ui_context),
                PosterOptions::from_settings("ui", &self.settings.ui),
            )
        })
        .clone()
    }

    /// The background poster, spawning its looper thread on first call
    ///
    /// # Errors
    /// [`ContextError::Spawn`] if the looper thread could not be started
    pub fn background_poster(&self) -> Result<Poster, ContextError> {
        let mut background = lock_unpoisoned(&self.background);
        if let Some(existing) = background.as_ref() {
            return Ok(existing.poster.clone());
        }

        let settings = &self.settings.background;
        let looper = Arc::new(ThreadLooper::spawn(settings.thread_name.as_str())?);
        let poster = Poster::new(
            looper.clone(),
            PosterOptions::from_settings("background", &settings.poster_settings()),
        );

        tracing::info!("Background poster started on thread {}", looper.name());
        *background = Some(Background {
            looper,
            poster: poster.clone(),
        });
        Ok(poster)
    }

    /// Run `action` on the background thread without waiting for it
    pub fn on_background<F>(&self, action: F) -> Result<Arc<AsyncTask>, DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.background_poster()?.run_async(action)
    }

    /// Run `action` on the UI thread without waiting for it
    pub fn on_ui_async<F>(&self, action: F) -> Result<Arc<AsyncTask>, DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ui_poster().run_async(action)
    }

    /// Run `func` on the UI thread and wait for its value
    pub fn on_ui_sync<T, F>(&self, func: F) -> Result<T, TaskError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.ui_poster().run_sync(func)
    }

    /// Run `func` on the UI thread, waiting at most `timeout` for its value
    pub fn on_ui_sync_timeout<T, F>(
        &self,
        func: F,
        timeout: Duration,
        cancel_on_timeout: bool,
    ) -> Result<T, TaskError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.ui_poster()
            .run_sync_timeout(func, timeout, cancel_on_timeout)
    }

    /// Dispose both posters and stop the background thread.
    ///
    /// Pending tasks are discarded and blocked sync callers released.
    pub fn dispose(&self) {
        let ui = lock_unpoisoned(&self.ui).take();
        let background = lock_unpoisoned(&self.background).take();

        if let Some(poster) = ui {
            poster.dispose();
            poster.metrics().log_summary(poster.name());
        }

        // Locks are released before joining: the looper may be running a
        // callback that calls back into the registry.
        if let Some(Background { looper, poster }) = background {
            poster.dispose();
            poster.metrics().log_summary(poster.name());
            looper.quit();
        }

        tracing::debug!("Poster registry disposed");
    }
}

impl Drop for PosterRegistry {
    fn drop(&mut self) {
        self.dispose();
    }
}
