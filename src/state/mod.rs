//! Lifecycle state machine

mod machine;

pub use machine::{InvalidMove, LifecycleState, Move, StateMachine, Stateful};
