//! Data models for eventpost configuration.
//!
//! - [`RunSettings`]: everything loaded from `eventpost.yaml`
//! - [`PosterSettings`]: budget and aliasing of the UI poster
//! - [`BackgroundSettings`]: the same for the background poster, plus its thread name
//! - [`LoggingSettings`]: log directory, file prefix and verbosity
//!
//! All structs use `#[serde(default)]`, so a partial file (or none at all)
//! yields the documented defaults.

pub mod settings;

pub use settings::{
    BackgroundSettings, DEFAULT_BACKGROUND_THREAD, LoggingSettings, PosterSettings, RunSettings,
    SettingsError,
};
