//! Error types
//!
//! Programmer errors (illegal transitions, tree misuse, invalid roots) are
//! surfaced immediately. Test failures are expected and travel as values.

use thiserror::Error;

use crate::models::TestFailure;
use crate::state::InvalidMove;

/// Convenience alias used across the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Structural problems found before a run is allowed to start
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Valid test tree required: '{name}' is {state}, expected pending")]
    NotPending { name: String, state: &'static str },
}

/// Library error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    InvalidMove(#[from] InvalidMove),

    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Cannot add '{0}': node already has a parent")]
    AlreadyAttached(String),

    #[error("Cannot add '{0}': node is an ancestor of the target")]
    WouldCycle(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    TestFailure(#[from] TestFailure),

    #[error("View initialisation failed: {0}")]
    ViewInit(String),
}

impl Error {
    /// True for failures raised by a test action rather than by misuse of the API
    pub fn is_test_failure(&self) -> bool {
        matches!(self, Error::TestFailure(_))
    }
}
