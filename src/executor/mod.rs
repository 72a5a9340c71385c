//! Test execution engine
//!
//! [`Runner`] drives a test tree level by level; [`BoundedQueue`] caps how
//! many siblings run at once.

mod queue;
mod runner;

pub use queue::{job, BoundedQueue, Job};
pub use runner::{RunState, Runner, RunnerOptions};
