//! The operation engine: given a proposed transformation over one or more
//! input container states, derive signed flow edges, compute resulting
//! output states, validate conservation invariants, and commit atomically.
//!
//! This crate is the only place in the workspace that knows about
//! containers, operations, and the repository boundary; the pure
//! composition math lives one layer down in `cellar_composition`.

pub mod builder;
pub mod commit;
pub mod error;
pub mod invariants;
pub mod model;
pub mod repository;
pub mod request;
pub mod snapshot;

pub use commit::{commit, commit_with_deadline};
pub use error::{BuilderError, CommitError, RepoError};
pub use invariants::Violation;
pub use repository::{CommitWrite, Repository};
