//! tom-runner: a hierarchical test-execution engine
//!
//! Tests are [`TestNode`]s arranged in a tree. Each node owns a lifecycle
//! state machine and an event channel whose events bubble to the root.
//! A [`Runner`] walks the tree level by level (`before`, main, `after`),
//! runs siblings through a bounded batch queue, and aggregates
//! [`RunStats`] from the events it observes.
//!
//! ```no_run
//! use tom_runner::{Action, Runner, TestNode};
//!
//! # async fn demo() -> tom_runner::Result<()> {
//! let root = TestNode::suite("math");
//! root.before("setup", Action::sync(|_| Ok(())))?;
//! root.test("add", Action::sync(|_| Ok(1 + 1)))?;
//! root.test("slow", Action::deferred(|_| async { Ok::<_, anyhow::Error>("done") }))?;
//!
//! let stats = Runner::new(root)?.start().await?;
//! assert_eq!(stats.pass, 3);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod models;
pub mod sample;
pub mod state;
pub mod tree;
pub mod utils;
pub mod views;

pub use error::{Error, Result, ValidationError};
pub use events::{Emitter, Event, EventChannel, ListenerId, Payload};
pub use executor::{BoundedQueue, RunState, Runner, RunnerOptions};
pub use models::{
    recompute_only_gating, Action, NodeOptions, RunStats, TestContext, TestFailure, TestNode,
    TestState, Timing,
};
pub use state::{InvalidMove, LifecycleState, Stateful};
pub use tree::Treeable;
pub use views::{LogView, View};
