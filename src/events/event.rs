//! Event values carried through the channel

use serde_json::Value;

use crate::models::{RunStats, TestFailure, TestNode};

/// Data attached to an emitted event
#[derive(Clone, Debug, Default)]
pub enum Payload {
    #[default]
    None,
    /// A lifecycle transition
    State {
        state: &'static str,
        previous: &'static str,
    },
    /// A lifecycle reset, carrying the state it was reset from
    Reset { previous: &'static str },
    /// Number of tests about to run
    Count(usize),
    /// Value produced by a passing test
    Value(Value),
    /// Reason a test failed
    Failure(TestFailure),
    /// Final run statistics
    Stats(RunStats),
}

/// A named event, optionally raised on behalf of a test node.
///
/// `target` is the node that originally emitted the event. It is preserved
/// while the event bubbles to ancestors, so any listener up the tree can tell
/// which descendant raised it.
#[derive(Clone, Debug)]
pub struct Event {
    pub name: String,
    pub target: Option<TestNode>,
    pub payload: Payload,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            target: None,
            payload,
        }
    }

    pub fn with_target(mut self, target: TestNode) -> Self {
        self.target = Some(target);
        self
    }

    /// Name of the originating node, if any
    pub fn target_name(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.name())
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&TestFailure> {
        match &self.payload {
            Payload::Failure(f) => Some(f),
            _ => None,
        }
    }

    pub fn count(&self) -> Option<usize> {
        match self.payload {
            Payload::Count(n) => Some(n),
            _ => None,
        }
    }

    pub fn stats(&self) -> Option<&RunStats> {
        match &self.payload {
            Payload::Stats(s) => Some(s),
            _ => None,
        }
    }
}
