//! Generic state machine with a fixed table of legal moves

use parking_lot::Mutex;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::events::{Emitter, Payload};

/// A state usable with [`StateMachine`]. `as_str` doubles as the name of the
/// event fired on entering the state.
pub trait LifecycleState: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    fn as_str(&self) -> &'static str;
}

/// Illegal transition request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidMove {
    /// No move in the table leads to `target`
    #[error("Invalid state: {target}")]
    UnknownTarget { target: &'static str },

    /// `target` is reachable, but not from `current`
    #[error("Can only move to '{target}' from {} (not '{current}')", quote_origins(.valid_from))]
    NoRoute {
        target: &'static str,
        current: &'static str,
        valid_from: Vec<&'static str>,
    },
}

fn quote_origins(origins: &[&'static str]) -> String {
    if origins.is_empty() {
        return "<unspecified>".to_string();
    }
    origins
        .iter()
        .map(|o| format!("'{o}'"))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// One row of the move table: any state in `from` may move to any state in `to`
#[derive(Clone, Debug)]
pub struct Move<S> {
    pub from: Vec<S>,
    pub to: Vec<S>,
}

impl<S> Move<S> {
    pub fn new(from: impl IntoIterator<Item = S>, to: impl IntoIterator<Item = S>) -> Self {
        Self {
            from: from.into_iter().collect(),
            to: to.into_iter().collect(),
        }
    }

    /// Single-state move
    pub fn one(from: S, to: S) -> Self {
        Self {
            from: vec![from],
            to: vec![to],
        }
    }
}

/// Holds the current state and validates every requested transition
#[derive(Debug)]
pub struct StateMachine<S> {
    initial: S,
    current: Mutex<S>,
    moves: Vec<Move<S>>,
}

impl<S: LifecycleState> StateMachine<S> {
    pub fn new(initial: S, moves: Vec<Move<S>>) -> Self {
        Self {
            initial,
            current: Mutex::new(initial),
            moves,
        }
    }

    pub fn state(&self) -> S {
        *self.current.lock()
    }

    pub fn initial(&self) -> S {
        self.initial
    }

    /// Every state from which `target` can be reached, in table order
    pub fn valid_origins(&self, target: S) -> Vec<S> {
        self.moves
            .iter()
            .filter(|m| m.to.contains(&target))
            .flat_map(|m| m.from.iter().copied())
            .collect()
    }

    /// Commit a transition to `next`.
    ///
    /// Returns `Ok(None)` when already in `next`, `Ok(Some(previous))` when
    /// the move was made.
    pub fn transition(&self, next: S) -> Result<Option<S>, InvalidMove> {
        let mut current = self.current.lock();
        if *current == next {
            return Ok(None);
        }

        if !self.moves.iter().any(|m| m.to.contains(&next)) {
            return Err(InvalidMove::UnknownTarget {
                target: next.as_str(),
            });
        }

        let legal = self
            .moves
            .iter()
            .any(|m| m.from.contains(&*current) && m.to.contains(&next));
        if !legal {
            return Err(InvalidMove::NoRoute {
                target: next.as_str(),
                current: current.as_str(),
                valid_from: self
                    .valid_origins(next)
                    .iter()
                    .map(LifecycleState::as_str)
                    .collect(),
            });
        }

        Ok(Some(std::mem::replace(&mut *current, next)))
    }

    /// Restore the initial state without validation, returning the prior state
    pub fn reset(&self) -> S {
        std::mem::replace(&mut *self.current.lock(), self.initial)
    }
}

/// Something that owns a [`StateMachine`] and announces its transitions.
///
/// A committed transition fires `state` (with the new and previous state)
/// followed by an event named after the new state carrying `payload`.
pub trait Stateful: Emitter {
    type State: LifecycleState;

    fn machine(&self) -> &StateMachine<Self::State>;

    fn state(&self) -> Self::State {
        self.machine().state()
    }

    fn set_state(&self, next: Self::State, payload: Payload) -> Result<(), InvalidMove> {
        if let Some(previous) = self.machine().transition(next)? {
            debug!("state {} -> {}", previous.as_str(), next.as_str());
            self.emit_named(
                "state",
                Payload::State {
                    state: next.as_str(),
                    previous: previous.as_str(),
                },
            );
            self.emit_named(next.as_str(), payload);
        }
        Ok(())
    }

    fn reset_state(&self) {
        let previous = self.machine().reset();
        self.emit_named(
            "reset",
            Payload::Reset {
                previous: previous.as_str(),
            },
        );
    }
}
