//! Test lifecycle states, failure reasons and timing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::state::{LifecycleState, Move};

/// Lifecycle state of a test node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestState {
    Pending,
    InProgress,
    Skipped,
    Ignored,
    Todo,
    Pass,
    Fail,
}

impl TestState {
    /// Legal moves for a test node
    pub fn moves() -> Vec<Move<TestState>> {
        vec![
            Move::one(TestState::Pending, TestState::InProgress),
            Move::one(TestState::Pending, TestState::Skipped),
            Move::one(TestState::Pending, TestState::Ignored),
            Move::one(TestState::Pending, TestState::Todo),
            Move::one(TestState::InProgress, TestState::Pass),
            Move::one(TestState::InProgress, TestState::Fail),
        ]
    }

    pub fn all() -> Vec<TestState> {
        vec![
            TestState::Pending,
            TestState::InProgress,
            TestState::Skipped,
            TestState::Ignored,
            TestState::Todo,
            TestState::Pass,
            TestState::Fail,
        ]
    }

    /// True once the test has run to completion
    pub fn is_ended(&self) -> bool {
        matches!(self, TestState::Pass | TestState::Fail)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TestState::Pending => " ",
            TestState::InProgress => "…",
            TestState::Skipped => "-",
            TestState::Ignored => "·",
            TestState::Todo => "○",
            TestState::Pass => "✓",
            TestState::Fail => "⨯",
        }
    }
}

impl LifecycleState for TestState {
    fn as_str(&self) -> &'static str {
        match self {
            TestState::Pending => "pending",
            TestState::InProgress => "in-progress",
            TestState::Skipped => "skipped",
            TestState::Ignored => "ignored",
            TestState::Todo => "todo",
            TestState::Pass => "pass",
            TestState::Fail => "fail",
        }
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a test failed
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestFailure {
    /// The action returned an error
    #[error("{message}")]
    Failed { message: String, detail: String },

    /// A deferred action did not settle within the configured bound
    #[error("Timeout expired [{millis}]")]
    Timeout { millis: u64 },

    /// The action panicked
    #[error("Test panicked: {message}")]
    Panicked { message: String },
}

impl TestFailure {
    pub fn from_error(err: &anyhow::Error) -> Self {
        TestFailure::Failed {
            message: format!("{err:#}"),
            detail: format!("{err:?}"),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        let message = message.into();
        TestFailure::Failed {
            detail: message.clone(),
            message,
        }
    }

    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        TestFailure::Panicked { message }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TestFailure::Timeout { .. })
    }

    /// Full failure trace, including any error chain
    pub fn detail(&self) -> String {
        match self {
            TestFailure::Failed { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }
}

/// Wall-clock timing of a single test execution
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
}

impl Timing {
    pub(crate) fn begin(&mut self, at: DateTime<Utc>) {
        self.start = Some(at);
    }

    pub(crate) fn finish(&mut self, at: DateTime<Utc>, duration: Duration) {
        self.end = Some(at);
        self.duration = Some(duration);
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.map(|d| d.as_millis() as u64).unwrap_or(0)
    }
}
