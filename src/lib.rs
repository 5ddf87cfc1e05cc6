// eventpost - time-sliced task posting onto single-threaded event loops
//
// This is the library crate containing the dispatcher, its tasks and execution
// contexts. The binary crate (main.rs) is a small demo driving them.

pub mod clock;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod task;

// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::ConfigManager;
pub use context::{ContextError, ExecutionContext, PumpedLooper, ThreadLooper};
pub use dispatch::{
    DispatchError, DispatchTag, Dispatcher, DrainOutcome, Poster, PosterOptions, TaskQueue,
    WakeHandle,
};
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use models::{RunSettings, SettingsError};
pub use registry::PosterRegistry;
pub use task::{AsyncTask, RunOutcome, SyncTask, Task, TaskCore, TaskError, TaskId, ValueSyncTask};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
