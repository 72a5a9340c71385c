//! Run observers
//!
//! A [`View`] receives run-level callbacks from the runner. Every method has
//! a no-op default, so a view implements only what it cares about.

mod log;

pub use log::LogView;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::events::{Event, Payload};
use crate::models::{RunStats, TestFailure, TestNode};

pub trait View: Send + Sync {
    /// Awaited once before the run starts
    fn init(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        async { Ok(()) }.boxed()
    }

    fn start(&self, _count: usize) {}

    fn end(&self, _stats: &RunStats) {}

    fn test_start(&self, _node: &TestNode) {}

    fn test_pass(&self, _node: &TestNode, _result: &Value) {}

    fn test_fail(&self, _node: &TestNode, _failure: &TestFailure) {}

    fn test_skip(&self, _node: &TestNode) {}

    fn test_ignore(&self, _node: &TestNode) {}

    fn test_todo(&self, _node: &TestNode) {}
}

/// Route a runner event to the matching view callback
pub(crate) fn notify(view: &dyn View, event: &Event) {
    match (event.name.as_str(), event.target.as_ref(), &event.payload) {
        ("start", _, Payload::Count(count)) => view.start(*count),
        ("end", _, Payload::Stats(stats)) => view.end(stats),
        ("test-start", Some(node), _) => view.test_start(node),
        ("test-pass", Some(node), Payload::Value(result)) => view.test_pass(node, result),
        ("test-fail", Some(node), Payload::Failure(failure)) => view.test_fail(node, failure),
        ("test-skip", Some(node), _) => view.test_skip(node),
        ("test-ignore", Some(node), _) => view.test_ignore(node),
        ("test-todo", Some(node), _) => view.test_todo(node),
        _ => {}
    }
}
