//! Integration tests for runjs
//!
//! These tests require `node` and `npm` on PATH.
//! Run with: cargo test -p runjs --features integration-tests
//!
//! Tests that download packages are marked `#[ignore]`. To include them:
//!    cargo test -p runjs --features integration-tests -- --include-ignored

#![cfg(feature = "integration-tests")]

use std::fs;
use std::path::Path;

use runjs::config::Config;

mod config_loading;
mod execution;
mod http_api;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Default configuration rooted in a throwaway directory
pub(crate) fn test_config(workspace_root: &Path) -> Config {
    let mut config = Config::default();
    config.workspace_root = workspace_root.to_path_buf();
    config.limits.run_timeout = 5.0;
    config.rate_limit.sweep_probability = 0.0;
    config
}
