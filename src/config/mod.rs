use crate::models::RunSettings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use ::config::{Config, Environment, File, FileFormat, Map};
use std::fs;

/// File name of the settings file inside the configuration directory
pub const SETTINGS_FILE: &str = "eventpost.yaml";

/// Prefix of environment variables overriding the settings file.
///
/// Nested keys are separated by `__`, e.g. `EVENTPOST_UI__BUDGET_MS=8`.
pub const ENV_PREFIX: &str = "EVENTPOST";

/// Configuration manager for loading and saving `eventpost.yaml`.
///
/// Settings are layered: built-in defaults, then the YAML file (optional),
/// then `EVENTPOST_*` environment variables.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing `eventpost.yaml`; created if missing
    ///
    /// # Returns
    /// A new ConfigManager instance
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
        })
    }

    /// Load settings from the file and the process environment.
    ///
    /// # Returns
    /// The validated settings; defaults when the file doesn't exist
    pub fn load_settings(&self) -> Result<RunSettings> {
        self.load_settings_from(None)
    }

    /// Load settings, taking environment overrides from `env` instead of the
    /// process environment when given.
    pub fn load_settings_from(&self, env: Option<Map<String, String>>) -> Result<RunSettings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let layered = Config::builder()
            .add_source(File::new(self.settings_path.as_str(), FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let settings: RunSettings = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Save the settings file.
    ///
    /// # Arguments
    /// * `settings` - The RunSettings to save
    pub fn save_settings(&self, settings: &RunSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();

        let settings = manager.load_settings_from(Some(Map::new())).unwrap();
        assert_eq!(settings, RunSettings::default());
    }

    #[test]
    fn test_load_save_settings() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut settings = RunSettings::default();
        settings.ui.budget_ms = 33;
        settings.background.thread_name = "io".to_string();
        manager.save_settings(&settings).unwrap();

        let loaded = manager.load_settings_from(Some(Map::new())).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_environment_overrides_file() {
        let (manager, _temp_dir) = create_test_config_manager();
        manager.save_settings(&RunSettings::default()).unwrap();

        let mut env = Map::new();
        env.insert("EVENTPOST_UI__BUDGET_MS".to_string(), "8".to_string());
        env.insert("EVENTPOST_BACKGROUND__ONLY_ASYNC".to_string(), "false".to_string());

        let settings = manager.load_settings_from(Some(env)).unwrap();
        assert_eq!(settings.ui.budget_ms, 8);
        assert!(!settings.background.only_async);
        assert_eq!(settings.background.budget_ms, 3000);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.settings_path(), "ui:\n  budget_ms: 0\n").unwrap();

        let result = manager.load_settings_from(Some(Map::new()));
        assert!(result.is_err());
    }
}
