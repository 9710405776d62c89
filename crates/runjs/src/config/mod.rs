use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::flavor::ModuleFlavor;

pub mod flavor;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../runjs.example.toml");

/// Prefix for environment variable overrides (`RUNJS_LIMITS__RUN_TIMEOUT=5`)
pub const ENV_PREFIX: &str = "RUNJS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown module type '{0}' (expected 'esm' or 'commonjs')")]
    UnknownModuleType(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for runjs
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory holding one workspace per module flavor (`esm/`, `cjs/`)
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Path to the node binary (uses PATH if not specified)
    #[serde(default)]
    pub node_path: Option<PathBuf>,

    /// Path to the npm binary (uses PATH if not specified)
    #[serde(default)]
    pub npm_path: Option<PathBuf>,

    /// Standard-error lines containing any of these substrings do not count
    /// as a runtime error.
    #[serde(default = "default_benign_stderr")]
    pub benign_stderr: Vec<String>,

    #[serde(default)]
    pub limits: ExecutionLimits,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub janitor: JanitorConfig,
}

impl Config {
    /// Create a new config from the embedded example
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the path to the node binary
    pub fn node_binary(&self) -> PathBuf {
        self.node_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("node"))
    }

    /// Get the path to the npm binary
    pub fn npm_binary(&self) -> PathBuf {
        self.npm_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("npm"))
    }

    /// Directory of the workspace for a flavor
    pub fn workspace_dir(&self, flavor: ModuleFlavor) -> PathBuf {
        self.workspace_root.join(flavor.dir_name())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

/// Time and size bounds for subprocesses
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionLimits {
    /// Wall clock limit for running submitted code, in seconds
    #[serde(default = "default_run_timeout")]
    pub run_timeout: f64,

    /// Wall clock limit for a package installation, in seconds
    #[serde(default = "default_install_timeout")]
    pub install_timeout: Option<f64>,

    /// Bytes of stdout/stderr kept per stream
    #[serde(default = "default_max_output")]
    pub max_output: Option<u64>,
}

impl ExecutionLimits {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.run_timeout)
    }

    pub fn install_timeout(&self) -> Option<Duration> {
        self.install_timeout.map(Duration::from_secs_f64)
    }

    pub fn max_output(&self) -> Option<usize> {
        self.max_output
            .map(|bytes| usize::try_from(bytes).unwrap_or(usize::MAX))
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            run_timeout: default_run_timeout(),
            install_timeout: default_install_timeout(),
            max_output: default_max_output(),
        }
    }
}

/// Request budgets enforced in front of the API
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Admission window length in seconds
    #[serde(default = "default_window")]
    pub window: u64,

    /// Requests admitted per client key per window
    #[serde(default = "default_max_per_client")]
    pub max_per_client: u32,

    /// Requests admitted across all clients per window
    #[serde(default = "default_max_global")]
    pub max_global: u32,

    /// Chance that an admitted request sweeps expired client windows
    #[serde(default = "default_sweep_probability")]
    pub sweep_probability: f64,

    /// Trusted proxy headers consulted, in order, for the client address
    #[serde(default = "default_client_headers")]
    pub client_headers: Vec<String>,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            max_per_client: default_max_per_client(),
            max_global: default_max_global(),
            sweep_probability: default_sweep_probability(),
            client_headers: default_client_headers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "127.0.0.1:3000")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Periodic uninstall of every workspace dependency
#[derive(Debug, Clone, Deserialize)]
pub struct JanitorConfig {
    /// Run the janitor inside the server process
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between passes
    #[serde(default = "default_janitor_interval")]
    pub interval: u64,
}

impl JanitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_janitor_interval(),
        }
    }
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("temp")
}

fn default_benign_stderr() -> Vec<String> {
    vec![
        "ExperimentalWarning".to_string(),
        "--trace-warnings".to_string(),
    ]
}

fn default_run_timeout() -> f64 {
    10.0
}

fn default_install_timeout() -> Option<f64> {
    Some(120.0)
}

fn default_max_output() -> Option<u64> {
    Some(1024 * 1024)
}

fn default_window() -> u64 {
    60
}

fn default_max_per_client() -> u32 {
    60
}

fn default_max_global() -> u32 {
    1000
}

fn default_sweep_probability() -> f64 {
    0.01
}

fn default_client_headers() -> Vec<String> {
    vec![
        "cf-connecting-ip".to_string(),
        "x-real-ip".to_string(),
        "x-forwarded-for".to_string(),
    ]
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_janitor_interval() -> u64 {
    60 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binaries_default_to_path_lookup() {
        let config = Config::default();
        assert_eq!(config.node_binary(), PathBuf::from("node"));
        assert_eq!(config.npm_binary(), PathBuf::from("npm"));
    }

    #[test]
    fn binaries_custom_path() {
        let config = Config {
            node_path: Some(PathBuf::from("/usr/local/bin/node")),
            npm_path: Some(PathBuf::from("/usr/local/bin/npm")),
            ..Config::default()
        };
        assert_eq!(config.node_binary(), PathBuf::from("/usr/local/bin/node"));
        assert_eq!(config.npm_binary(), PathBuf::from("/usr/local/bin/npm"));
    }

    #[test]
    fn workspace_dirs_per_flavor() {
        let config = Config {
            workspace_root: PathBuf::from("/srv/runjs"),
            ..Config::default()
        };
        assert_eq!(
            config.workspace_dir(ModuleFlavor::Esm),
            PathBuf::from("/srv/runjs/esm")
        );
        assert_eq!(
            config.workspace_dir(ModuleFlavor::CommonJs),
            PathBuf::from("/srv/runjs/cjs")
        );
    }

    #[test]
    fn default_rate_limits() {
        let config = Config::default();
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.rate_limit.max_per_client, 60);
        assert_eq!(config.rate_limit.max_global, 1000);
        assert_eq!(config.rate_limit.client_headers[0], "cf-connecting-ip");
    }

    #[test]
    fn default_limits_have_timeout() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.run_timeout(), Duration::from_secs(10));
        assert_eq!(limits.install_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(limits.max_output(), Some(1024 * 1024));
    }

    #[test]
    fn janitor_disabled_by_default() {
        let config = Config::default();
        assert!(!config.janitor.enabled);
        assert_eq!(config.janitor.interval(), Duration::from_secs(3600));
    }
}
