//! Controller-specific error types.
//!
//! This module defines error types specific to the stamp controller that are
//! not covered by upstream library errors.

use thiserror::Error;

/// Errors that can occur in the stamp controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// The reconciliation engine failed to start
    #[error(transparent)]
    Engine(#[from] reconcile_core::ControllerError),
}
