//! Integration tests for ConfigManager and settings file handling
//!
//! These tests verify:
//! - Settings loading and saving
//! - Defaults when the file is missing or partial
//! - Environment overrides
//! - Validation and malformed YAML
//! - Settings flowing into the posters built by PosterRegistry

use camino::Utf8PathBuf;
use config::Map;
use eventpost::{ConfigManager, PosterRegistry, PumpedLooper, RunSettings};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

fn no_env() -> Option<Map<String, String>> {
    Some(Map::new())
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
    assert_eq!(manager.settings_path(), config_path.join("eventpost.yaml"));
}

#[test]
fn test_load_default_settings() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    // Settings file doesn't exist, should return defaults
    let settings = manager.load_settings_from(no_env()).unwrap();

    assert_eq!(settings.ui.budget_ms, 16);
    assert!(!settings.ui.only_async);
    assert_eq!(settings.background.budget_ms, 3000);
    assert!(settings.background.only_async);
    assert_eq!(settings.background.thread_name, "eventpost-background");
}

#[test]
fn test_save_and_load_settings() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut settings = RunSettings::default();
    settings.ui.budget_ms = 8;
    settings.ui.only_async = true;
    settings.background.budget_ms = 500;
    settings.logging.debug = true;
    manager.save_settings(&settings).unwrap();

    let contents = fs::read_to_string(manager.settings_path()).unwrap();
    assert!(contents.contains("budget_ms: 8"));

    let loaded = manager.load_settings_from(no_env()).unwrap();
    assert_eq!(loaded, settings);
}

#[test]
fn test_partial_settings_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(
        manager.settings_path(),
        "background:\n  thread_name: io-loop\nlogging:\n  console: false\n",
    )
    .unwrap();

    let settings = manager.load_settings_from(no_env()).unwrap();
    assert_eq!(settings.background.thread_name, "io-loop");
    assert_eq!(settings.background.budget_ms, 3000);
    assert!(!settings.logging.console);
    assert_eq!(settings.ui.budget_ms, 16);
}

#[test]
fn test_environment_overrides() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    fs::write(manager.settings_path(), "ui:\n  budget_ms: 20\n").unwrap();

    let mut env = Map::new();
    env.insert("EVENTPOST_UI__BUDGET_MS".to_string(), "5".to_string());
    env.insert(
        "EVENTPOST_BACKGROUND__THREAD_NAME".to_string(),
        "from-env".to_string(),
    );
    env.insert("UNRELATED_UI__BUDGET_MS".to_string(), "99".to_string());

    let settings = manager.load_settings_from(Some(env)).unwrap();
    assert_eq!(settings.ui.budget_ms, 5);
    assert_eq!(settings.background.thread_name, "from-env");
}

#[test]
fn test_config_directory_creation() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf())
        .unwrap()
        .join("nonexistent_dir");

    // Directory doesn't exist yet
    assert!(!config_path.exists());

    // Creating ConfigManager should create the directory
    let _manager = ConfigManager::new(&config_path).unwrap();

    // Directory should now exist
    assert!(config_path.exists());
}

#[test]
fn test_invalid_yaml_handling() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(manager.settings_path(), "invalid: yaml: content: {{").unwrap();

    let result = manager.load_settings_from(no_env());
    assert!(result.is_err(), "Should fail to parse invalid YAML");
}

#[test]
fn test_zero_budget_rejected() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(manager.settings_path(), "background:\n  budget_ms: 0\n").unwrap();

    let error = manager.load_settings_from(no_env()).unwrap_err();
    assert!(format!("{:#}", error).contains("background"));
}

#[test]
fn test_settings_flow_into_registry() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    fs::write(
        manager.settings_path(),
        "ui:\n  budget_ms: 40\n  only_async: true\nbackground:\n  budget_ms: 250\n",
    )
    .unwrap();

    let settings = manager.load_settings_from(no_env()).unwrap();
    let ui = Arc::new(PumpedLooper::new());
    let registry = PosterRegistry::new(settings, ui);

    let ui_poster = registry.ui_poster();
    assert_eq!(ui_poster.budget_ms(), 40);
    assert!(ui_poster.is_sync_aliased());

    let background = registry.background_poster().unwrap();
    assert_eq!(background.budget_ms(), 250);
    registry.dispose();
}

#[test]
fn test_concurrent_settings_access() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = Arc::new(ConfigManager::new(&config_path).unwrap());
    manager.save_settings(&RunSettings::default()).unwrap();

    let mut handles = vec![];

    for _ in 0..10 {
        let manager_clone = manager.clone();
        let handle = std::thread::spawn(move || {
            let _settings = manager_clone.load_settings_from(no_env()).unwrap();
        });
        handles.push(handle);
    }

    // All threads should complete successfully
    for handle in handles {
        handle.join().unwrap();
    }
}
