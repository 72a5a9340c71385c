//! Run orchestrator
//!
//! Walks a test tree, running every level in `before`, main and `after`
//! order through a [`BoundedQueue`], and turns the node events bubbling up
//! to the root into run-level `test-*` events and statistics.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info};

use super::queue::{job, BoundedQueue, Job};
use crate::error::{Error, Result, ValidationError};
use crate::events::{Emitter, Event, EventChannel, ListenOptions, ListenerId, Payload};
use crate::models::{RunStats, TestFailure, TestNode, TestState};
use crate::state::{LifecycleState, Move, StateMachine, Stateful};
use crate::tree::Treeable;
use crate::views::{self, View};

/// Lifecycle of a whole run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunState {
    Pending,
    InProgress,
    Pass,
    Fail,
}

impl RunState {
    pub fn moves() -> Vec<Move<RunState>> {
        vec![
            Move::one(RunState::Pending, RunState::InProgress),
            Move::new([RunState::InProgress], [RunState::Pass, RunState::Fail]),
        ]
    }
}

impl LifecycleState for RunState {
    fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::InProgress => "in-progress",
            RunState::Pass => "pass",
            RunState::Fail => "fail",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runner behaviour switches
#[derive(Clone, Debug, Default)]
pub struct RunnerOptions {
    /// Log the full failure trace of every failing test
    pub debug: bool,
}

/// Executes a test tree and aggregates its results.
///
/// The runner listens to its root for as long as it lives; dropping it
/// removes those listeners again.
#[derive(Clone)]
pub struct Runner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    root: TestNode,
    options: RunnerOptions,
    machine: StateMachine<RunState>,
    channel: EventChannel,
    stats: Mutex<RunStats>,
    ended: AtomicBool,
    view: Option<Arc<dyn View>>,
    subscriptions: Mutex<Vec<ListenerId>>,
    /// First programmer error hit while running, reported by `start`
    fatal: Mutex<Option<Error>>,
}

impl Runner {
    pub fn new(root: TestNode) -> Result<Self> {
        Self::with_options(root, RunnerOptions::default(), None)
    }

    /// Validate `root` and subscribe to its events.
    ///
    /// Every node of the tree must still be pending.
    pub fn with_options(
        root: TestNode,
        options: RunnerOptions,
        view: Option<Arc<dyn View>>,
    ) -> Result<Self> {
        validate(&root)?;

        let runner = Runner {
            inner: Arc::new(RunnerInner {
                root: root.clone(),
                options,
                machine: StateMachine::new(RunState::Pending, RunState::moves()),
                channel: EventChannel::new(),
                stats: Mutex::new(RunStats::new()),
                ended: AtomicBool::new(false),
                view,
                subscriptions: Mutex::new(Vec::new()),
                fatal: Mutex::new(None),
            }),
        };

        let weak: Weak<RunnerInner> = Arc::downgrade(&runner.inner);
        let id = root.on_any(move |event| {
            if let Some(inner) = weak.upgrade() {
                Runner { inner }.on_node_event(event);
            }
        });
        runner.inner.subscriptions.lock().push(id);

        if let Some(view) = runner.inner.view.clone() {
            runner.inner.channel.subscribe(
                None,
                Arc::new(move |event: &Event| views::notify(view.as_ref(), event)),
                ListenOptions::default(),
            );
        }

        Ok(runner)
    }

    pub fn root(&self) -> &TestNode {
        &self.inner.root
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.inner.options
    }

    pub fn state(&self) -> RunState {
        self.inner.machine.state()
    }

    /// Snapshot of the statistics so far
    pub fn stats(&self) -> RunStats {
        self.inner.stats.lock().clone()
    }

    /// True once the whole tree has drained
    pub fn ended(&self) -> bool {
        self.inner.ended.load(Ordering::SeqCst)
    }

    /// Run the whole tree and return the final statistics.
    ///
    /// Test failures only mark the run as failed. An error is returned for
    /// misuse: a failing view, a second `start`, or an illegal transition
    /// hit while running.
    pub async fn start(&self) -> Result<RunStats> {
        if let Some(view) = &self.inner.view {
            view.init()
                .await
                .map_err(|e| Error::ViewInit(format!("{e:#}")))?;
        }

        let root = self.inner.root.clone();
        let total = root
            .descendants()
            .iter()
            .filter(|node| node.has_action())
            .count();

        self.set_state(RunState::InProgress, Payload::Count(total))?;
        {
            let mut stats = self.inner.stats.lock();
            stats.total = total;
            stats.start = Some(Utc::now());
        }
        info!("Running '{}': {} tests", root.name(), total);
        self.emit_named("start", Payload::Count(total));

        if root.has_action() {
            futures::join!(self.run_test(&root), self.run_children(root.clone()));
        } else {
            self.run_children(root.clone()).await;
        }

        self.inner.ended.store(true, Ordering::SeqCst);
        if self.state() != RunState::Fail {
            self.set_state(RunState::Pass, Payload::None)?;
        }

        let stats = {
            let mut stats = self.inner.stats.lock();
            stats.end = Some(Utc::now());
            stats.clone()
        };
        info!(
            "Run '{}' {} in {}ms",
            root.name(),
            self.state(),
            stats.elapsed_ms()
        );
        self.emit_named("end", Payload::Stats(stats.clone()));

        let fatal = self.inner.fatal.lock().take();
        match fatal {
            Some(err) => Err(err),
            None => Ok(stats),
        }
    }

    /// Run the children of `node` group by group. Each child runs
    /// concurrently with its own subtree.
    fn run_children(&self, node: TestNode) -> BoxFuture<'_, ()> {
        async move {
            let children = node.children();
            if children.is_empty() {
                return;
            }

            let (before, rest): (Vec<_>, Vec<_>) =
                children.into_iter().partition(|c| c.options().before);
            let (after, main): (Vec<_>, Vec<_>) =
                rest.into_iter().partition(|c| c.options().after);
            let ceiling = node.options().effective_max_concurrency();

            for (label, group) in [("before", before), ("main", main), ("after", after)] {
                if group.is_empty() {
                    continue;
                }
                debug!("'{}': {} group of {}", node.name(), label, group.len());

                let jobs: Vec<Job<'_, ()>> = group
                    .into_iter()
                    .map(move |child| {
                        job(move || async move {
                            futures::join!(
                                self.run_test(&child),
                                self.run_children(child.clone())
                            );
                        })
                    })
                    .collect();
                BoundedQueue::new(jobs, ceiling).process().await;
            }
        }
        .boxed()
    }

    async fn run_test(&self, node: &TestNode) {
        match node.run().await {
            Ok(_) => {}
            Err(Error::TestFailure(failure)) => {
                if let Some(trace) = self.failure_trace(node, &failure) {
                    error!("{}", trace);
                }
                self.mark_failed();
            }
            Err(err) => {
                error!("'{}' could not run: {}", node.path(), err);
                self.inner.fatal.lock().get_or_insert(err);
                self.mark_failed();
            }
        }
    }

    /// Full failure detail, reported only in debug mode
    fn failure_trace(&self, node: &TestNode, failure: &TestFailure) -> Option<String> {
        self.inner
            .options
            .debug
            .then(|| format!("{}: {}", node.path(), failure.detail()))
    }

    fn mark_failed(&self) {
        if self.state() != RunState::InProgress {
            return;
        }
        if let Err(err) = self.set_state(RunState::Fail, Payload::None) {
            self.inner.fatal.lock().get_or_insert(err.into());
        }
    }

    /// Translate a node lifecycle event into a runner event
    fn on_node_event(&self, event: &Event) {
        let Some(node) = event.target.clone() else {
            return;
        };

        let name = match event.name.as_str() {
            "in-progress" => "test-start",
            "pass" => {
                self.inner.stats.lock().pass += 1;
                "test-pass"
            }
            "fail" => {
                self.inner.stats.lock().fail += 1;
                self.mark_failed();
                "test-fail"
            }
            "skipped" => {
                self.inner.stats.lock().skip += 1;
                "test-skip"
            }
            "ignored" => {
                self.inner.stats.lock().ignore += 1;
                "test-ignore"
            }
            "todo" => {
                self.inner.stats.lock().todo += 1;
                "test-todo"
            }
            _ => return,
        };

        self.emit(Event::new(name, event.payload.clone()).with_target(node));
    }
}

fn validate(root: &TestNode) -> Result<()> {
    for node in root.descendants() {
        let state = node.state();
        if state != TestState::Pending {
            return Err(ValidationError::NotPending {
                name: node.name().to_string(),
                state: state.as_str(),
            }
            .into());
        }
    }
    Ok(())
}

impl Drop for RunnerInner {
    fn drop(&mut self) {
        for id in self.subscriptions.get_mut().drain(..) {
            self.root.off(id);
        }
    }
}

impl Emitter for Runner {
    fn channel(&self) -> &EventChannel {
        &self.inner.channel
    }

    fn event(&self, name: &str, payload: Payload) -> Event {
        Event::new(name, payload)
    }
}

impl Stateful for Runner {
    type State = RunState;

    fn machine(&self) -> &StateMachine<RunState> {
        &self.inner.machine
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("root", &self.inner.root.name())
            .field("state", &self.state())
            .field("ended", &self.ended())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, NodeOptions};
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn pass(value: &'static str) -> Action {
        Action::sync(move |_| Ok(value))
    }

    fn boom() -> Action {
        Action::sync(|_| -> anyhow::Result<()> { anyhow::bail!("boom") })
    }

    fn sleeper(millis: u64) -> Action {
        Action::deferred(move |_| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok::<_, anyhow::Error>(millis)
        })
    }

    fn record(runner: &Runner) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        runner.on_any(move |ev| {
            let target = ev.target_name().unwrap_or("-").to_string();
            sink.lock().push(format!("{}:{}", target, ev.name));
        });
        log
    }

    fn position(log: &[String], entry: &str) -> usize {
        log.iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("missing {entry} in {log:?}"))
    }

    #[tokio::test]
    async fn test_pass_and_fail_stats() {
        let root = TestNode::suite("root");
        let a = root.test("a", pass("x")).unwrap();
        let b = root.test("b", boom()).unwrap();

        let runner = Runner::new(root).unwrap();
        let stats = runner.start().await.unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.pass, 1);
        assert_eq!(stats.fail, 1);
        assert_eq!(stats.skip, 0);
        assert_eq!(stats.ignore, 0);
        assert!(stats.end.is_some());
        assert_eq!(a.state(), TestState::Pass);
        assert_eq!(b.state(), TestState::Fail);
        assert_eq!(runner.state(), RunState::Fail);
        assert!(runner.ended());
    }

    #[tokio::test]
    async fn test_before_group_starts_first() {
        let root = TestNode::suite("root");
        root.test("t1", pass("1")).unwrap();
        root.before("setup", pass("s")).unwrap();
        root.test("t2", pass("2")).unwrap();

        let runner = Runner::new(root).unwrap();
        let log = record(&runner);
        runner.start().await.unwrap();

        let starts: Vec<String> = log
            .lock()
            .iter()
            .filter(|e| e.ends_with(":test-start"))
            .cloned()
            .collect();
        assert_eq!(
            starts,
            vec!["setup:test-start", "t1:test-start", "t2:test-start"]
        );
        assert_eq!(runner.state(), RunState::Pass);
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_group_waits_for_main() {
        let root = TestNode::suite("root");
        root.test("slow", sleeper(30)).unwrap();
        root.after("cleanup", pass("c")).unwrap();
        root.test("fast", pass("f")).unwrap();

        let runner = Runner::new(root).unwrap();
        let log = record(&runner);
        runner.start().await.unwrap();

        let log = log.lock().clone();
        assert!(position(&log, "cleanup:test-start") > position(&log, "slow:test-pass"));
        assert!(position(&log, "cleanup:test-start") > position(&log, "fast:test-pass"));
    }

    #[tokio::test]
    async fn test_fail_is_sticky() {
        let root = TestNode::suite("root");
        root.test("bad", boom()).unwrap();
        root.test("good", pass("x")).unwrap();
        root.after("also-good", pass("y")).unwrap();

        let runner = Runner::new(root).unwrap();
        let ended = Arc::new(Mutex::new(None));
        let sink = ended.clone();
        runner.once("end", move |ev| *sink.lock() = ev.stats().cloned());

        let stats = runner.start().await.unwrap();
        assert_eq!(runner.state(), RunState::Fail);
        assert_eq!(stats.pass, 2);
        assert_eq!(ended.lock().as_ref(), Some(&stats));
    }

    #[tokio::test]
    async fn test_nested_tree() {
        let root = TestNode::suite("root");
        let g1 = root.group("g1").unwrap();
        g1.test("x", pass("x")).unwrap();
        g1.skip("y", pass("y")).unwrap();
        let g2 = root.group("g2").unwrap();
        g2.todo("later", None).unwrap();
        let inner = g2.group("inner").unwrap();
        let z = inner.test("z", boom()).unwrap();

        let runner = Runner::new(root).unwrap();
        let log = record(&runner);
        let stats = runner.start().await.unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.pass, 1);
        assert_eq!(stats.fail, 1);
        assert_eq!(stats.skip, 1);
        assert_eq!(stats.ignore, 3);
        assert_eq!(stats.todo, 1);
        assert_eq!(g1.state(), TestState::Ignored);
        assert_eq!(z.state(), TestState::Fail);
        assert!(log.lock().contains(&"z:test-fail".to_string()));
        assert!(log.lock().contains(&"later:test-todo".to_string()));
    }

    #[tokio::test]
    async fn test_only_gating_skips_others() {
        let root = TestNode::suite("root");
        let a = root.test("a", pass("a")).unwrap();
        let b = root.only("b", pass("b")).unwrap();
        let group = root.group("group").unwrap();
        let c = group.test("c", pass("c")).unwrap();

        let stats = Runner::new(root).unwrap().start().await.unwrap();

        assert_eq!(a.state(), TestState::Skipped);
        assert_eq!(c.state(), TestState::Skipped);
        assert_eq!(b.state(), TestState::Pass);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pass, 1);
        assert_eq!(stats.skip, 2);
        assert_eq!(stats.ignore, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let root = TestNode::suite("root");
        let hang = root
            .test_with(
                "hang",
                Action::deferred(|_| async {
                    futures::future::pending::<()>().await;
                    Ok::<_, anyhow::Error>(())
                }),
                NodeOptions::new().with_timeout(50),
            )
            .unwrap();

        let runner = Runner::new(root).unwrap();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        runner.on("test-fail", move |ev| {
            sink.lock().extend(ev.failure().cloned());
        });

        let stats = runner.start().await.unwrap();
        assert_eq!(stats.fail, 1);
        assert_eq!(hang.state(), TestState::Fail);
        assert_eq!(*failures.lock(), vec![TestFailure::Timeout { millis: 50 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_ceiling() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let action = {
            let active = active.clone();
            let peak = peak.clone();
            Action::deferred(move |_| {
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(())
                }
            })
        };

        let root = TestNode::suite_with("root", NodeOptions::new().with_max_concurrency(2));
        for i in 0..5 {
            root.test(&format!("t{i}"), action.clone()).unwrap();
        }

        let stats = Runner::new(root).unwrap().start().await.unwrap();
        assert_eq!(stats.pass, 5);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_root_with_action_is_run() {
        let root = TestNode::leaf("solo", pass("x"));
        let stats = Runner::new(root.clone()).unwrap().start().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.pass, 1);
        assert_eq!(root.result(), Some(Ok(json!("x"))));
    }

    #[tokio::test]
    async fn test_rejects_tree_that_already_ran() {
        let root = TestNode::suite("root");
        let a = root.test("a", pass("x")).unwrap();
        a.run().await.unwrap();

        let err = Runner::new(root).unwrap_err();
        assert_eq!(
            err,
            Error::Validation(ValidationError::NotPending {
                name: "a".to_string(),
                state: "pass",
            })
        );
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let root = TestNode::suite("root");
        root.test("a", pass("x")).unwrap();
        let runner = Runner::new(root).unwrap();
        runner.start().await.unwrap();
        assert!(matches!(
            runner.start().await.unwrap_err(),
            Error::InvalidMove(_)
        ));
    }

    #[test]
    fn test_failure_trace_only_in_debug() {
        let root = TestNode::suite("root");
        let b = root.test("b", boom()).unwrap();
        let err = anyhow::anyhow!("boom").context("checking b");
        let failure = TestFailure::from_error(&err);

        let quiet = Runner::new(root.clone()).unwrap();
        assert_eq!(quiet.failure_trace(&b, &failure), None);
        drop(quiet);

        let loud =
            Runner::with_options(root, RunnerOptions { debug: true }, None).unwrap();
        let trace = loud.failure_trace(&b, &failure).unwrap();
        assert!(trace.starts_with("root > b: "));
        assert!(trace.contains("checking b"));
        assert!(trace.contains("boom"));
    }

    #[test]
    fn test_drop_removes_root_listeners() {
        let root = TestNode::suite("root");
        let runner = Runner::new(root.clone()).unwrap();
        assert_eq!(root.channel().listener_count(), 1);
        drop(runner);
        assert_eq!(root.channel().listener_count(), 0);
    }

    #[derive(Default)]
    struct RecordingView {
        fail_init: bool,
        calls: Mutex<Vec<String>>,
    }

    impl View for RecordingView {
        fn init(&self) -> BoxFuture<'_, anyhow::Result<()>> {
            async move {
                if self.fail_init {
                    anyhow::bail!("no terminal");
                }
                self.calls.lock().push("init".to_string());
                Ok(())
            }
            .boxed()
        }

        fn start(&self, count: usize) {
            self.calls.lock().push(format!("start {count}"));
        }

        fn end(&self, stats: &RunStats) {
            self.calls.lock().push(format!("end {}/{}", stats.pass, stats.total));
        }

        fn test_pass(&self, node: &TestNode, result: &Value) {
            self.calls.lock().push(format!("pass {node} {result}"));
        }

        fn test_fail(&self, node: &TestNode, failure: &TestFailure) {
            self.calls.lock().push(format!("fail {node} {failure}"));
        }
    }

    #[tokio::test]
    async fn test_view_receives_run_events() {
        let root = TestNode::suite("root");
        root.test("a", pass("x")).unwrap();
        root.test("b", boom()).unwrap();

        let view = Arc::new(RecordingView::default());
        let runner =
            Runner::with_options(root, RunnerOptions { debug: true }, Some(view.clone())).unwrap();
        runner.start().await.unwrap();

        assert_eq!(
            *view.calls.lock(),
            vec!["init", "start 2", "pass a \"x\"", "fail b boom", "end 1/2"]
        );
    }

    #[tokio::test]
    async fn test_view_init_failure_prevents_run() {
        let root = TestNode::suite("root");
        let a = root.test("a", pass("x")).unwrap();
        let view = Arc::new(RecordingView {
            fail_init: true,
            ..RecordingView::default()
        });

        let runner = Runner::with_options(root, RunnerOptions::default(), Some(view)).unwrap();
        let err = runner.start().await.unwrap_err();
        assert_eq!(err, Error::ViewInit("no terminal".to_string()));
        assert_eq!(runner.state(), RunState::Pending);
        assert_eq!(a.state(), TestState::Pending);
    }
}
