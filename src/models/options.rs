//! Per-node configuration

use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT_MILLIS: u64 = 10_000;
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

fn default_timeout_millis() -> u64 {
    DEFAULT_TIMEOUT_MILLIS
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

/// Node configuration, fixed once the node is built
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOptions {
    /// Time limit for a deferred action
    #[serde(default = "default_timeout_millis")]
    pub timeout_millis: u64,

    /// How many children may run at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub skip: bool,

    /// Run only this node (and other `only` nodes) in the whole tree
    #[serde(default)]
    pub only: bool,

    /// Run and complete before its siblings
    #[serde(default)]
    pub before: bool,

    /// Run after its siblings have completed
    #[serde(default)]
    pub after: bool,

    /// Mark as incomplete; never executed
    #[serde(default)]
    pub todo: bool,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            timeout_millis: DEFAULT_TIMEOUT_MILLIS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            skip: false,
            only: false,
            before: false,
            after: false,
            todo: false,
        }
    }
}

impl NodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, millis: u64) -> Self {
        self.timeout_millis = millis;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }

    pub fn only(mut self) -> Self {
        self.only = true;
        self
    }

    pub fn before(mut self) -> Self {
        self.before = true;
        self
    }

    pub fn after(mut self) -> Self {
        self.after = true;
        self
    }

    pub fn todo(mut self) -> Self {
        self.todo = true;
        self
    }

    /// Concurrency ceiling actually applied; zero falls back to the default
    pub fn effective_max_concurrency(&self) -> usize {
        if self.max_concurrency == 0 {
            DEFAULT_MAX_CONCURRENCY
        } else {
            self.max_concurrency
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = NodeOptions::default();
        assert_eq!(options.timeout_millis, 10_000);
        assert_eq!(options.max_concurrency, 10);
        assert!(!options.skip && !options.only && !options.todo);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let options: NodeOptions = serde_yaml::from_str("timeout_millis: 50\nonly: true\n").unwrap();
        assert_eq!(options.timeout_millis, 50);
        assert_eq!(options.max_concurrency, 10);
        assert!(options.only);
    }

    #[test]
    fn test_zero_concurrency_falls_back() {
        let options = NodeOptions::new().with_max_concurrency(0);
        assert_eq!(options.effective_max_concurrency(), 10);
        assert_eq!(
            NodeOptions::new().with_max_concurrency(3).effective_max_concurrency(),
            3
        );
    }
}
