//! Data models for the test tree
//!
//! Nodes, their options and actions, lifecycle states and run statistics.

mod action;
mod node;
mod options;
mod stats;
mod test_result;

pub use action::{Action, TestContext};
pub use node::{recompute_only_gating, TestNode};
pub use options::{NodeOptions, DEFAULT_MAX_CONCURRENCY, DEFAULT_TIMEOUT_MILLIS};
pub use stats::RunStats;
pub use test_result::{TestFailure, TestState, Timing};
