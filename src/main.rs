//! eventpost - demo binary
//!
//! Drives a UI poster on the main thread the way a host application would:
//! - Tokio workers act as producers, posting fire-and-forget and blocking work
//!   onto the "UI" thread and the background looper
//! - The main thread owns a [`PumpedLooper`] and pumps it once per simulated
//!   frame until every producer has finished
//!
//! # Execution Flow
//!
//! 1. Load `eventpost.yaml` (directory from the first argument, default `.`)
//! 2. Initialize logging → logs/eventpost.<date>
//! 3. Create the UI looper and the [`PosterRegistry`]
//! 4. Spawn producers on a tokio runtime with 4 worker threads
//! 5. Pump the UI looper until the producers are done, then drain what is left
//! 6. Log metrics, dispose the registry and shut down the runtime

use anyhow::Result;
use eventpost::{APP_NAME, ConfigManager, PosterRegistry, PumpedLooper, TaskError, VERSION};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const PRODUCERS: usize = 4;
const TASKS_PER_PRODUCER: usize = 250;

/// Callbacks run per pump, standing in for one frame of the host loop
const CALLBACKS_PER_FRAME: usize = 8;
const FRAME: Duration = Duration::from_millis(4);

fn main() -> Result<()> {
    let config_dir = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());
    let config_manager = ConfigManager::new(config_dir.as_str())?;
    let settings = config_manager.load_settings()?;

    let _log_guard = eventpost::logging::setup_logging(&settings.logging)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("eventpost-producer")
        .build()?;

    tracing::info!("Tokio runtime initialized with {} worker threads", 4);

    // The main thread plays the UI thread
    let ui = Arc::new(PumpedLooper::new());
    let registry = Arc::new(PosterRegistry::new(settings, ui.clone()));
    let ui_frames = Arc::new(AtomicUsize::new(0));
    let background_sum = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let registry = Arc::clone(&registry);
            let ui_frames = Arc::clone(&ui_frames);
            let background_sum = Arc::clone(&background_sum);
            runtime.spawn(async move {
                produce(producer, registry, ui_frames, background_sum).await
            })
        })
        .collect();

    let started = Instant::now();
    let mut frames = 0usize;
    while !producers.iter().all(|handle| handle.is_finished()) {
        ui.pump(CALLBACKS_PER_FRAME)?;
        frames += 1;
        std::thread::sleep(FRAME);
    }
    let leftover = ui.run_until_idle()?;

    for producer in producers {
        match runtime.block_on(producer) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Producer failed: {}", e),
            Err(e) => tracing::error!("Producer task panicked: {}", e),
        }
    }

    tracing::info!(
        "Pumped {} frames in {:.2}s ({} callbacks after producers finished)",
        frames,
        started.elapsed().as_secs_f64(),
        leftover
    );
    tracing::info!(
        "UI async tasks run: {}, background sum: {}",
        ui_frames.load(Ordering::SeqCst),
        background_sum.load(Ordering::SeqCst)
    );

    registry.dispose();
    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Shutdown complete");
    Ok(())
}

/// One producer: a burst of async UI work, some background work and a few
/// blocking round-trips to the UI thread.
async fn produce(
    producer: usize,
    registry: Arc<PosterRegistry>,
    ui_frames: Arc<AtomicUsize>,
    background_sum: Arc<AtomicUsize>,
) -> Result<(), TaskError> {
    for i in 0..TASKS_PER_PRODUCER {
        let ui_frames = Arc::clone(&ui_frames);
        registry.on_ui_async(move || {
            ui_frames.fetch_add(1, Ordering::Relaxed);
        })?;

        let background_sum = Arc::clone(&background_sum);
        registry.on_background(move || {
            background_sum.fetch_add(i, Ordering::Relaxed);
        })?;

        if i % 50 == 0 {
            tokio::task::yield_now().await;
        }
    }

    // Sync posts block the caller, so keep them off the async workers
    let blocking = Arc::clone(&registry);
    let outcome = tokio::task::spawn_blocking(move || -> Result<(), TaskError> {
        let seen = blocking.on_ui_sync(|| std::thread::current().name().map(str::to_string))?;
        tracing::info!("Producer {} reached UI thread {:?}", producer, seen);

        match blocking.on_ui_sync_timeout(|| 42, Duration::from_millis(50), true) {
            Ok(value) => tracing::info!("Producer {} got {} within the timeout", producer, value),
            Err(TaskError::TimedOut { cancelled }) => tracing::warn!(
                "Producer {} timed out waiting for the UI thread (cancelled: {})",
                producer,
                cancelled
            ),
            Err(e) => return Err(e),
        }
        Ok(())
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Producer {} blocking section failed: {}", producer, e);
            Err(TaskError::Panicked(e.to_string()))
        }
    }
}
