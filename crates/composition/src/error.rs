use thiserror::Error;

/// Errors raised by the pure composition algebra. None of these are
/// retriable by re-running the same inputs; they indicate a malformed
/// caller request (spec.md §7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositionError {
    #[error("shares sum to a different quantity than the source composition")]
    InconsistentShares,

    #[error("cannot blend flows with differing units")]
    UnitMismatch,

    #[error("weights accepting this attribute sum to zero but the total to distribute is non-zero")]
    ZeroWeightSum,

    #[error("blend requires at least one flow")]
    EmptyBlend,
}
