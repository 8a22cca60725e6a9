//! Error taxonomy for the backend.
//!
//! Mirrors the abstract categories from the specification: a missing field
//! is recoverable ([`BackendError::NotFound`]), a caller violating one of
//! the vnode/version invariants is a programming error on the caller's
//! part ([`BackendError::InvariantViolation`]), an engine refusing an
//! operation it structurally cannot support is distinct from both
//! ([`BackendError::Unsupported`]), and a broken internal invariant means
//! the backend is no longer trustworthy ([`BackendError::Internal`]).

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors produced by backend, version, and vnode operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// `get`/`delete` on a field that was never set, or is currently
    /// tombstoned, at the queried version.
    #[error("field {0:?} not found")]
    NotFound(String),
    /// A caller violated one of the vnode/version invariants (V1-V8):
    /// writing through a non-head vnode, mixing versions, branching from
    /// a head, committing vnodes from different heads, or referencing a
    /// vnode from a different backend.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// The operation is not supported by this engine (e.g. `Nop::commit`,
    /// or `branch` from a non-empty list on a partial engine).
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    /// A split/rebalance invariant was violated or an assertion failed.
    /// The backend should be considered poisoned past this point.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BackendError {
    pub(crate) fn not_found(field: impl Into<String>) -> Self {
        Self::NotFound(field.into())
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
