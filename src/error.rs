//! Unified error handling for DnnForge
//!
//! This module provides the crate-level error type that consolidates the
//! domain-specific errors raised throughout the codebase:
//! - Primitive-library errors (carrying the library's numeric status)
//! - Tensor validation errors (shape, layout, element type)
//! - Registry and internal errors

use thiserror::Error;

use crate::dnn::{DnnError, DnnStatus};

/// Unified error type for DnnForge
#[derive(Debug, Error)]
pub enum DnnForgeError {
    /// Error raised by the primitive library during plan construction
    /// or execution
    #[error("primitive library error: {0}")]
    Dnn(#[from] DnnError),

    /// Invalid tensor shape
    #[error("invalid tensor shape: {0}")]
    InvalidTensorShape(String),

    /// Invalid tensor layout
    #[error("invalid tensor layout: {0}")]
    InvalidTensorLayout(String),

    /// Element type of a tensor does not match the requested view
    #[error("element type mismatch: {0}")]
    ElementTypeMismatch(String),

    /// Kernel registration failed
    #[error("kernel registration failed: {0}")]
    RegistrationFailed(String),

    /// Lock poisoned (indicates a bug or a panicked holder)
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),

    /// Internal error (indicates a bug)
    #[error("internal error: {0}")]
    InternalError(String),
}

impl DnnForgeError {
    /// Numeric status of the underlying library error, if this error
    /// originated inside the primitive library.
    pub fn dnn_status(&self) -> Option<DnnStatus> {
        match self {
            DnnForgeError::Dnn(err) => Some(err.status),
            _ => None,
        }
    }

    /// Check if this error indicates invalid caller input rather than a
    /// library or internal failure.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            DnnForgeError::InvalidTensorShape(_)
                | DnnForgeError::InvalidTensorLayout(_)
                | DnnForgeError::ElementTypeMismatch(_)
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for DnnForgeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        DnnForgeError::LockPoisoned(err.to_string())
    }
}

/// Helper type alias for Results using DnnForgeError
pub type ForgeResult<T> = std::result::Result<T, DnnForgeError>;
