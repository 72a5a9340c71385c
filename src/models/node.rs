//! Test node: a tree of tests and suites with a lifecycle each
//!
//! A [`TestNode`] is a cheap, clonable handle. Children are owned by their
//! parent; the parent link is weak. Every node carries its own
//! [`StateMachine`] and [`EventChannel`], and events bubble from a node to
//! all of its ancestors with the originating node preserved as the target.

use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::action::Invocation;
use super::{Action, NodeOptions, TestContext, TestFailure, TestState, Timing};
use crate::error::{Error, Result};
use crate::events::{Emitter, Event, EventChannel, Payload};
use crate::state::{InvalidMove, StateMachine, Stateful};
use crate::tree::Treeable;

/// Handle to a node in the test tree
#[derive(Clone)]
pub struct TestNode(Arc<NodeInner>);

struct NodeInner {
    name: String,
    action: Option<Action>,
    options: NodeOptions,
    parent: RwLock<Weak<NodeInner>>,
    children: RwLock<Vec<TestNode>>,
    index: AtomicUsize,
    machine: StateMachine<TestState>,
    channel: EventChannel,
    disabled_by_only: AtomicBool,
    result: Mutex<Option<Result<Value, TestFailure>>>,
    timing: Mutex<Timing>,
}

impl TestNode {
    pub fn new(name: impl Into<String>, action: Option<Action>, options: NodeOptions) -> Self {
        TestNode(Arc::new(NodeInner {
            name: name.into(),
            action,
            options,
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            index: AtomicUsize::new(1),
            machine: StateMachine::new(TestState::Pending, TestState::moves()),
            channel: EventChannel::new(),
            disabled_by_only: AtomicBool::new(false),
            result: Mutex::new(None),
            timing: Mutex::new(Timing::default()),
        }))
    }

    /// Grouping node without an action
    pub fn suite(name: impl Into<String>) -> Self {
        Self::new(name, None, NodeOptions::default())
    }

    pub fn suite_with(name: impl Into<String>, options: NodeOptions) -> Self {
        Self::new(name, None, options)
    }

    /// Leaf node with default options
    pub fn leaf(name: impl Into<String>, action: Action) -> Self {
        Self::new(name, Some(action), NodeOptions::default())
    }

    /// Attach several trees under a common root named `name`. A single tree
    /// is returned as is.
    pub fn combine(mut nodes: Vec<TestNode>, name: &str, options: NodeOptions) -> Result<Self> {
        let node = if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            let root = Self::suite_with(name, options);
            for node in nodes {
                root.add(node)?;
            }
            root
        };
        recompute_only_gating(&node.root());
        Ok(node)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn action(&self) -> Option<&Action> {
        self.0.action.as_ref()
    }

    pub fn has_action(&self) -> bool {
        self.0.action.is_some()
    }

    pub fn options(&self) -> &NodeOptions {
        &self.0.options
    }

    /// 1-based position among siblings at insertion time
    pub fn index(&self) -> usize {
        self.0.index.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TestState {
        self.0.machine.state()
    }

    /// True iff the node reached `pass` or `fail`
    pub fn ended(&self) -> bool {
        self.state().is_ended()
    }

    pub fn disabled_by_only(&self) -> bool {
        self.0.disabled_by_only.load(Ordering::SeqCst)
    }

    /// Value returned by the action, or the reason it failed
    pub fn result(&self) -> Option<Result<Value, TestFailure>> {
        self.0.result.lock().clone()
    }

    pub fn timing(&self) -> Timing {
        self.0.timing.lock().clone()
    }

    pub fn child(&self, name: &str) -> Option<TestNode> {
        self.0
            .children
            .read()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// Names from the root down to this node, joined with ` > `
    pub fn path(&self) -> String {
        let mut names: Vec<String> = self
            .parents()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        names.reverse();
        names.push(self.name().to_string());
        names.join(" > ")
    }

    pub fn ptr_eq(&self, other: &TestNode) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Insert `child` as the last child of this node.
    ///
    /// Fails if a sibling already has the same name, if `child` is attached
    /// elsewhere, or if `child` is this node or one of its ancestors.
    pub fn add(&self, child: TestNode) -> Result<TestNode> {
        if child.parent().is_some() {
            return Err(Error::AlreadyAttached(child.name().to_string()));
        }
        if self.root().ptr_eq(&child) {
            return Err(Error::WouldCycle(child.name().to_string()));
        }

        {
            let mut children = self.0.children.write();
            if children.iter().any(|c| c.name() == child.name()) {
                return Err(Error::DuplicateName(child.name().to_string()));
            }
            *child.0.parent.write() = Arc::downgrade(&self.0);
            children.push(child.clone());
            child.0.index.store(children.len(), Ordering::SeqCst);
        }

        debug!("added '{}' to '{}' at {}", child.name(), self.name(), child.index());
        recompute_only_gating(&self.root());
        Ok(child)
    }

    /// Detach `child`. Returns `None` if it is not a child of this node.
    pub fn remove(&self, child: &TestNode) -> Option<TestNode> {
        let removed = {
            let mut children = self.0.children.write();
            let position = children.iter().position(|c| c.ptr_eq(child))?;
            children.remove(position)
        };
        *removed.0.parent.write() = Weak::new();

        recompute_only_gating(&self.root());
        recompute_only_gating(&removed);
        Some(removed)
    }

    pub fn test_with(&self, name: &str, action: Action, options: NodeOptions) -> Result<TestNode> {
        self.add(TestNode::new(name, Some(action), options))
    }

    pub fn test(&self, name: &str, action: Action) -> Result<TestNode> {
        self.test_with(name, action, NodeOptions::default())
    }

    pub fn group(&self, name: &str) -> Result<TestNode> {
        self.add(TestNode::suite(name))
    }

    pub fn group_with(&self, name: &str, options: NodeOptions) -> Result<TestNode> {
        self.add(TestNode::suite_with(name, options))
    }

    pub fn skip(&self, name: &str, action: Action) -> Result<TestNode> {
        self.test_with(name, action, NodeOptions::new().skip())
    }

    pub fn only(&self, name: &str, action: Action) -> Result<TestNode> {
        self.test_with(name, action, NodeOptions::new().only())
    }

    /// Add a test which must run and complete before its siblings
    pub fn before(&self, name: &str, action: Action) -> Result<TestNode> {
        self.test_with(name, action, NodeOptions::new().before())
    }

    /// Add a test which runs once its siblings have completed
    pub fn after(&self, name: &str, action: Action) -> Result<TestNode> {
        self.test_with(name, action, NodeOptions::new().after())
    }

    /// Add an incomplete test; it is never executed
    pub fn todo(&self, name: &str, action: Option<Action>) -> Result<TestNode> {
        self.add(TestNode::new(name, action, NodeOptions::new().todo()))
    }

    /// Execute this node's action (not its children).
    ///
    /// Resolves to `Ok(None)` when the node is not executed (no action,
    /// skipped, disabled by `only`, todo), to the action's value on pass, and
    /// to [`Error::TestFailure`] on fail.
    pub async fn run(&self) -> Result<Option<Value>> {
        let Some(action) = self.0.action.clone() else {
            let next = if self.options().todo {
                TestState::Todo
            } else {
                TestState::Ignored
            };
            self.set_state(next, Payload::None)?;
            return Ok(None);
        };

        if self.disabled_by_only() || self.options().skip {
            self.set_state(TestState::Skipped, Payload::None)?;
            return Ok(None);
        }
        if self.options().todo {
            self.set_state(TestState::Todo, Payload::None)?;
            return Ok(None);
        }

        self.set_state(TestState::InProgress, Payload::None)?;
        let started = Instant::now();
        self.0.timing.lock().begin(Utc::now());

        let context = TestContext::new(self.name(), self.index());
        let outcome = match action.invoke(context) {
            Invocation::Ready(outcome) => outcome,
            Invocation::Pending(fut) => {
                race_timeout(self.name(), fut, self.options().timeout_millis).await
            }
        };

        self.0.timing.lock().finish(Utc::now(), started.elapsed());
        *self.0.result.lock() = Some(outcome.clone());

        match outcome {
            Ok(value) => {
                self.finish(TestState::Pass, Payload::Value(value.clone()))?;
                Ok(Some(value))
            }
            Err(failure) => {
                self.finish(TestState::Fail, Payload::Failure(failure.clone()))?;
                Err(failure.into())
            }
        }
    }

    fn finish(&self, state: TestState, payload: Payload) -> Result<(), InvalidMove> {
        self.set_state(state, payload)?;
        self.emit_named("end", Payload::None);
        Ok(())
    }

    /// Return this node to `pending`, clearing its result and timing
    pub fn reset(&self) {
        self.clear();
        recompute_only_gating(&self.root());
    }

    /// Reset this node and every descendant
    pub fn reset_tree(&self) {
        for node in self.descendants() {
            node.clear();
        }
        recompute_only_gating(&self.root());
    }

    fn clear(&self) {
        *self.0.result.lock() = None;
        *self.0.timing.lock() = Timing::default();
        self.0.disabled_by_only.store(false, Ordering::SeqCst);
        self.reset_state();
    }

    fn propagate(&self, event: &Event) {
        self.0.channel.dispatch(event);
        if let Some(parent) = self.parent() {
            parent.propagate(event);
        }
    }
}

/// Race a deferred action against `millis`. The action runs on its own task;
/// losing the race detaches that task rather than cancelling it.
async fn race_timeout(
    name: &str,
    fut: BoxFuture<'static, Result<Value, TestFailure>>,
    millis: u64,
) -> Result<Value, TestFailure> {
    let handle = tokio::spawn(fut);
    match tokio::time::timeout(Duration::from_millis(millis), handle).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) if join_error.is_panic() => {
            Err(TestFailure::from_panic(join_error.into_panic()))
        }
        Ok(Err(join_error)) => Err(TestFailure::message(join_error.to_string())),
        Err(_) => {
            warn!("'{}' timed out after {}ms", name, millis);
            Err(TestFailure::Timeout { millis })
        }
    }
}

/// Apply `only` gating across the tree rooted at `root`: when any node is
/// marked `only`, every node without it is disabled; otherwise none is.
pub fn recompute_only_gating(root: &TestNode) {
    let nodes = root.descendants();
    let only_exists = nodes.iter().any(|n| n.options().only);
    for node in &nodes {
        node.0
            .disabled_by_only
            .store(only_exists && !node.options().only, Ordering::SeqCst);
    }
}

impl Treeable for TestNode {
    fn parent(&self) -> Option<Self> {
        self.0.parent.read().upgrade().map(TestNode)
    }

    fn children(&self) -> Vec<Self> {
        self.0.children.read().clone()
    }
}

impl Emitter for TestNode {
    fn channel(&self) -> &EventChannel {
        &self.0.channel
    }

    fn event(&self, name: &str, payload: Payload) -> Event {
        Event::new(name, payload).with_target(self.clone())
    }

    /// Dispatch locally, then bubble to every ancestor. An event without a
    /// target is stamped with this node first.
    fn emit(&self, event: Event) {
        let event = if event.target.is_some() {
            event
        } else {
            event.with_target(self.clone())
        };
        self.propagate(&event);
    }
}

impl Stateful for TestNode {
    type State = TestState;

    fn machine(&self) -> &StateMachine<TestState> {
        &self.0.machine
    }
}

impl PartialEq for TestNode {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Display for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestNode")
            .field("name", &self.name())
            .field("index", &self.index())
            .field("state", &self.state())
            .field("children", &self.0.children.read().len())
            .finish()
    }
}
