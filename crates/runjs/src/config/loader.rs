//! Configuration file loading for runjs
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, ENV_PREFIX};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load the embedded defaults, then an optional file, then `RUNJS_*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, env_source())
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder()
            .add_source(File::from_str(crate::config::EXAMPLE_CONFIG, FileFormat::Toml));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config: Config = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_timeout(self.limits.run_timeout) {
            return Err(ConfigError::Invalid(
                "limits.run_timeout must be a positive number of seconds".to_string(),
            ));
        }
        if let Some(timeout) = self.limits.install_timeout
            && !is_valid_timeout(timeout)
        {
            return Err(ConfigError::Invalid(
                "limits.install_timeout must be a positive number of seconds".to_string(),
            ));
        }
        if self.limits.max_output == Some(0) {
            return Err(ConfigError::Invalid(
                "limits.max_output must be greater than zero".to_string(),
            ));
        }

        let rate = &self.rate_limit;
        if rate.window == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.window must be greater than zero".to_string(),
            ));
        }
        if rate.max_per_client == 0 || rate.max_global == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit caps must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&rate.sweep_probability) {
            return Err(ConfigError::Invalid(format!(
                "rate_limit.sweep_probability must be within [0, 1], got {}",
                rate.sweep_probability
            )));
        }
        if rate.client_headers.iter().any(|h| h.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "rate_limit.client_headers contains an empty header name".to_string(),
            ));
        }

        if self.benign_stderr.iter().any(String::is_empty) {
            // An empty pattern would match every line
            return Err(ConfigError::Invalid(
                "benign_stderr contains an empty pattern".to_string(),
            ));
        }

        if self.janitor.interval == 0 {
            return Err(ConfigError::Invalid(
                "janitor.interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Positive and representable as a [`Duration`]
fn is_valid_timeout(seconds: f64) -> bool {
    seconds > 0.0 && Duration::try_from_secs_f64(seconds).is_ok()
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
