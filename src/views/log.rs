//! Tracing-backed view

use serde_json::Value;
use tracing::{debug, error, info};

use super::View;
use crate::models::{RunStats, TestFailure, TestNode, TestState};

/// Reports every lifecycle event through `tracing`
#[derive(Clone, Debug, Default)]
pub struct LogView {
    /// Include ignored grouping nodes in the output
    pub verbose: bool,
}

impl LogView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    fn summary(stats: &RunStats) -> String {
        format!(
            "Completed {}/{} in {}ms - Pass: {} Fail: {} Skip: {} Ignore: {} Todo: {}",
            stats.completed(),
            stats.total,
            stats.elapsed_ms(),
            stats.pass,
            stats.fail,
            stats.skip,
            stats.ignore,
            stats.todo
        )
    }
}

impl View for LogView {
    fn start(&self, count: usize) {
        info!("Starting: {} tests", count);
    }

    fn end(&self, stats: &RunStats) {
        info!("{}", Self::summary(stats));
    }

    fn test_start(&self, node: &TestNode) {
        debug!("{} {}", TestState::InProgress.symbol(), node.path());
    }

    fn test_pass(&self, node: &TestNode, result: &Value) {
        let shown = if result.is_null() {
            "ok".to_string()
        } else {
            result.to_string()
        };
        info!(
            "{} {} {} [{}ms]",
            TestState::Pass.symbol(),
            node.path(),
            shown,
            node.timing().duration_ms()
        );
    }

    fn test_fail(&self, node: &TestNode, failure: &TestFailure) {
        error!(
            "{} {} [Error: {}]",
            TestState::Fail.symbol(),
            node.path(),
            failure
        );
    }

    fn test_skip(&self, node: &TestNode) {
        info!("{} {}", TestState::Skipped.symbol(), node.path());
    }

    fn test_ignore(&self, node: &TestNode) {
        if self.verbose {
            debug!("{} {}", TestState::Ignored.symbol(), node.path());
        }
    }

    fn test_todo(&self, node: &TestNode) {
        info!("{} {} (todo)", TestState::Todo.symbol(), node.path());
    }
}
