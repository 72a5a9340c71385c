//! Configuration
//!
//! A [`RunnerConfig`] file (YAML or JSON, chosen by extension) supplies run
//! defaults; [`EnvConfig`] overrides them from `TOM_RUNNER_*` variables.

pub mod env;

pub use env::EnvConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::executor::RunnerOptions;
use crate::models::NodeOptions;
use crate::utils::LogLevel;

/// File used when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "tom-runner.yaml";

/// Runner configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Log the full trace of every failing test
    pub debug: bool,

    pub log_level: LogLevel,

    /// Options applied to suites built from this config
    pub defaults: NodeOptions,
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

impl RunnerConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = if is_yaml(path) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply environment overrides on top of this config
    pub fn with_env(mut self, env: &EnvConfig) -> Self {
        if let Some(debug) = env.debug {
            self.debug = debug;
        }
        if let Some(level) = env.log_level {
            self.log_level = level;
        }
        if let Some(timeout) = env.timeout_millis {
            self.defaults.timeout_millis = timeout;
        }
        if let Some(max) = env.max_concurrency {
            self.defaults.max_concurrency = max;
        }
        self
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions { debug: self.debug }
    }
}
