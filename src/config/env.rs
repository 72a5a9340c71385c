//! Environment variable overrides

use std::env;

use crate::utils::LogLevel;

/// Environment variable prefix
const ENV_PREFIX: &str = "TOM_RUNNER";

/// Overrides read from `TOM_RUNNER_*` variables
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvConfig {
    /// TOM_RUNNER_DEBUG
    pub debug: Option<bool>,
    /// TOM_RUNNER_LOG
    pub log_level: Option<LogLevel>,
    /// TOM_RUNNER_TIMEOUT, in milliseconds
    pub timeout_millis: Option<u64>,
    /// TOM_RUNNER_MAX_CONCURRENCY
    pub max_concurrency: Option<usize>,
    /// TOM_RUNNER_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load overrides from the process environment
    pub fn load() -> Self {
        Self {
            debug: get_env_bool("DEBUG"),
            log_level: get_env_parse("LOG"),
            timeout_millis: get_env_parse("TIMEOUT"),
            max_concurrency: get_env_parse("MAX_CONCURRENCY"),
            config_file: get_env("CONFIG"),
        }
    }

    pub fn has_any(&self) -> bool {
        self.debug.is_some()
            || self.log_level.is_some()
            || self.timeout_millis.is_some()
            || self.max_concurrency.is_some()
            || self.config_file.is_some()
    }

    /// Print the overrides currently in effect
    pub fn print_summary(&self) {
        println!("Environment:");
        println!("  {}_DEBUG:           {:?}", ENV_PREFIX, self.debug);
        println!("  {}_LOG:             {:?}", ENV_PREFIX, self.log_level);
        println!("  {}_TIMEOUT:         {:?}", ENV_PREFIX, self.timeout_millis);
        println!("  {}_MAX_CONCURRENCY: {:?}", ENV_PREFIX, self.max_concurrency);
        println!("  {}_CONFIG:          {:?}", ENV_PREFIX, self.config_file);
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Restores the touched variables on drop
    struct EnvGuard(Vec<(String, Option<String>)>);

    impl EnvGuard {
        fn set(vars: &[(&str, &str)]) -> Self {
            let previous = vars
                .iter()
                .map(|(name, value)| {
                    let key = format!("{ENV_PREFIX}_{name}");
                    let old = env::var(&key).ok();
                    env::set_var(&key, value);
                    (key, old)
                })
                .collect();
            EnvGuard(previous)
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.0 {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(!config.has_any());
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = EnvGuard::set(&[
            ("DEBUG", "yes"),
            ("LOG", "warn"),
            ("TIMEOUT", "1500"),
            ("MAX_CONCURRENCY", "not-a-number"),
        ]);

        let config = EnvConfig::load();
        assert_eq!(config.debug, Some(true));
        assert_eq!(config.log_level, Some(LogLevel::Warn));
        assert_eq!(config.timeout_millis, Some(1500));
        assert_eq!(config.max_concurrency, None);
        assert!(config.has_any());
    }
}
