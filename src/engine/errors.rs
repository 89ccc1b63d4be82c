//! Error types for inference engine construction and queries.

use thiserror::Error;

/// Errors that can occur while building an engine or answering a query.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes. All public APIs return
/// `Result<T, InferError>` to avoid panics in library code.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum InferError {
    /// A precondition on user-supplied input was violated (e.g. an unknown
    /// level in evidence, a malformed network or junction-tree description).
    #[error("validation error: {0}")]
    Validation(String),

    /// A joint-distribution request violated one of its preconditions
    /// (empty, duplicated, overlapping or out-of-range variable sets).
    #[error("invalid join request: {0}")]
    InvalidJoin(String),

    /// Internal consistency failure (programmer error, not user error).
    /// Examples: a dangling formula reference, a separator with fewer than
    /// two adjacent cliques.
    #[error("internal error: {0}")]
    Internal(String),
}
