//! Engine error types.
//!
//! Per-key reconciliation failures never surface here; they travel through
//! [`crate::reconcile::Outcome`] and the rate-limited queue. These types
//! cover the two places an error escapes that loop: key parsing and
//! controller startup.

use thiserror::Error;

/// Errors raised when deriving or splitting a resource key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key cannot be parsed back into a namespace/name identity.
    #[error("malformed resource key: {0:?}")]
    Malformed(String),

    /// The object carries no name to derive a key from.
    #[error("object has no name")]
    MissingName,
}

/// Fatal controller errors.
///
/// Everything per-key is contained inside the worker loop; only startup can
/// fail the controller as a whole.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The local cache never reported full synchronization before the
    /// cancellation signal fired.
    #[error("failed to wait for caches to sync")]
    SyncFailed,
}
