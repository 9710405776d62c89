use std::path::PathBuf;

use runjs::config::{Config, ConfigError};

use super::FIXTURES_PATH;

fn fixture_config(name: &str) -> PathBuf {
    PathBuf::from(format!("{FIXTURES_PATH}/configs/{name}"))
}

#[test]
fn test_load_valid_config() {
    let config = Config::from_file(fixture_config("valid_full.toml")).expect("Failed to load config");

    assert_eq!(config.workspace_root, PathBuf::from("/var/lib/runjs"));
    assert_eq!(config.limits.run_timeout, 5.0);
    assert_eq!(config.rate_limit.window, 30);
    assert_eq!(config.rate_limit.client_headers, vec!["x-real-ip"]);
    assert!(config.janitor.enabled);
}

#[test]
fn test_load_minimal_config() {
    let config =
        Config::from_file(fixture_config("valid_minimal.toml")).expect("Failed to load config");

    assert_eq!(config.workspace_root, PathBuf::from("/tmp/runjs"));
    assert_eq!(config.rate_limit.max_per_client, 60);
    assert_eq!(config.rate_limit.max_global, 1000);
}

#[test]
fn test_load_layers_file_over_defaults() {
    let config = Config::load(Some(&fixture_config("valid_minimal.toml"))).expect("Failed to load");

    assert_eq!(config.workspace_root, PathBuf::from("/tmp/runjs"));
    assert_eq!(config.benign_stderr, vec!["ExperimentalWarning", "--trace-warnings"]);
}

#[test]
fn test_load_invalid_zero_window() {
    let result = Config::from_file(fixture_config("invalid_zero_window.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_sweep_probability() {
    let result = Config::from_file(fixture_config("invalid_sweep_probability.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_run_timeout() {
    let result = Config::from_file(fixture_config("invalid_run_timeout.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_missing_file() {
    let result = Config::from_file(fixture_config("does_not_exist.toml"));
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}
