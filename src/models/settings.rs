use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Thread name used for the background looper unless configured otherwise
pub const DEFAULT_BACKGROUND_THREAD: &str = "eventpost-background";

/// Problems found when validating [`RunSettings`]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
    #[error("budget for the {poster} poster must be greater than zero")]
    InvalidBudget { poster: &'static str },

    #[error("background thread name must not be empty")]
    EmptyThreadName,
}

/// Settings for everything eventpost creates on its own, from `eventpost.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunSettings {
    pub ui: PosterSettings,
    pub background: BackgroundSettings,
    pub logging: LoggingSettings,
}

impl RunSettings {
    /// Check the invariants serde cannot express
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.ui.budget_ms == 0 {
            return Err(SettingsError::InvalidBudget { poster: "ui" });
        }
        if self.background.budget_ms == 0 {
            return Err(SettingsError::InvalidBudget {
                poster: "background",
            });
        }
        if self.background.thread_name.trim().is_empty() {
            return Err(SettingsError::EmptyThreadName);
        }
        Ok(())
    }
}

/// Budget and aliasing of one poster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PosterSettings {
    /// Milliseconds a drain may hold the context before yielding
    pub budget_ms: u64,

    /// Send sync tasks through the async queue
    pub only_async: bool,
}

impl Default for PosterSettings {
    fn default() -> Self {
        Self {
            budget_ms: 16,
            only_async: false,
        }
    }
}

/// Background poster settings. The background poster runs on its own looper thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundSettings {
    pub budget_ms: u64,
    pub only_async: bool,
    pub thread_name: String,
}

impl BackgroundSettings {
    pub fn poster_settings(&self) -> PosterSettings {
        PosterSettings {
            budget_ms: self.budget_ms,
            only_async: self.only_async,
        }
    }
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            budget_ms: 3000,
            only_async: true,
            thread_name: DEFAULT_BACKGROUND_THREAD.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub dir: String,
    pub prefix: String,
    pub debug: bool,
    pub console: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            prefix: "eventpost".to_string(),
            debug: false,
            console: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RunSettings::default();

        assert_eq!(settings.ui.budget_ms, 16);
        assert!(!settings.ui.only_async);
        assert_eq!(settings.background.budget_ms, 3000);
        assert!(settings.background.only_async);
        assert_eq!(settings.background.thread_name, "eventpost-background");
        assert_eq!(settings.logging.prefix, "eventpost");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "ui:\n  budget_ms: 8\nbackground:\n  thread_name: worker\n";
        let settings: RunSettings = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(settings.ui.budget_ms, 8);
        assert!(!settings.ui.only_async);
        assert_eq!(settings.background.budget_ms, 3000);
        assert_eq!(settings.background.thread_name, "worker");
        assert_eq!(settings.logging, LoggingSettings::default());
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut settings = RunSettings::default();
        settings.background.budget_ms = 0;

        assert_eq!(
            settings.validate(),
            Err(SettingsError::InvalidBudget {
                poster: "background"
            })
        );

        settings.background.budget_ms = 10;
        settings.ui.budget_ms = 0;
        assert_eq!(
            settings.validate(),
            Err(SettingsError::InvalidBudget { poster: "ui" })
        );
    }

    #[test]
    fn test_validate_rejects_blank_thread_name() {
        let mut settings = RunSettings::default();
        settings.background.thread_name = "  ".to_string();

        assert_eq!(settings.validate(), Err(SettingsError::EmptyThreadName));
    }

    #[test]
    fn test_background_poster_settings() {
        let background = BackgroundSettings::default();
        let poster = background.poster_settings();

        assert_eq!(poster.budget_ms, 3000);
        assert!(poster.only_async);
    }
}
