//! Error surface (spec.md §6-§7). Three kinds: validation (every
//! violation reported, nothing committed), concurrency (retriable after
//! refetching head state), and store errors (retriable with backoff).
//! Builder misuse is a fourth, non-retriable kind raised before the
//! repository is ever touched.

use crate::invariants::Violation;
use crate::model::StateId;
use cellar_composition::{Amount, CompositionError};
use thiserror::Error;

/// Programmer-visible misuse of the builder: a malformed request that no
/// retry can fix (spec.md §7).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuilderError {
    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error("state {state_id:?} has negative remainder {remainder} after declared consumption")]
    NegativeRemainder { state_id: StateId, remainder: Amount },

    #[error("operation request has no input states")]
    NoInputs,
}

/// Opaque error surfaced by a concrete `Repository` implementation. The
/// in-memory store never actually populates a non-conflict instance of
/// this; a real store (Postgres, a property graph) would for transport
/// and transaction failures. `conflict` distinguishes the one case a
/// store *does* raise deliberately: a losing optimistic-concurrency race
/// on a head pointer (spec.md §5), which `commit` must surface as
/// `CommitError::InputNotCurrent` rather than a generic store error.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("repository error: {message}")]
pub struct RepoError {
    pub message: String,
    pub conflict: bool,
}

impl RepoError {
    pub fn new(message: impl Into<String>) -> Self {
        RepoError { message: message.into(), conflict: false }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        RepoError { message: message.into(), conflict: true }
    }
}

/// The error surface of `commit` (spec.md §6).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommitError {
    #[error("validation failed: {0:?}")]
    ValidationFailed(Vec<Violation>),

    #[error("input state is no longer the current head")]
    InputNotCurrent,

    #[error("referenced container does not exist")]
    InvalidContainer,

    #[error("container does not belong to the request's tenant")]
    CrossTenant,

    #[error("commit exceeded its deadline")]
    Timeout,

    #[error(transparent)]
    Store(RepoError),

    #[error(transparent)]
    Builder(#[from] BuilderError),

    #[error(transparent)]
    Composition(#[from] CompositionError),
}

impl From<RepoError> for CommitError {
    fn from(e: RepoError) -> Self {
        if e.conflict {
            CommitError::InputNotCurrent
        } else {
            CommitError::Store(e)
        }
    }
}
