//! Primitive library error types

use std::fmt;

use thiserror::Error;

/// Numeric status codes reported by the primitive library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DnnStatus {
    Success = 0,
    OutOfMemory = 1,
    InvalidArguments = 2,
    Unimplemented = 3,
    RuntimeError = 4,
}

impl DnnStatus {
    /// Raw numeric code as reported to callers
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for DnnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error raised by the primitive library, carrying the library's numeric
/// status and message text
#[derive(Debug, Clone, Error)]
#[error("status {status}: {message}")]
pub struct DnnError {
    pub status: DnnStatus,
    pub message: String,
}

impl DnnError {
    pub fn new(status: DnnStatus, message: impl Into<String>) -> Self {
        DnnError {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        DnnError::new(DnnStatus::InvalidArguments, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        DnnError::new(DnnStatus::Unimplemented, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        DnnError::new(DnnStatus::RuntimeError, message)
    }
}

/// Primitive library result type
pub type DnnResult<T> = Result<T, DnnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(DnnStatus::Success.code(), 0);
        assert_eq!(DnnStatus::OutOfMemory.code(), 1);
        assert_eq!(DnnStatus::InvalidArguments.code(), 2);
        assert_eq!(DnnStatus::Unimplemented.code(), 3);
        assert_eq!(DnnStatus::RuntimeError.code(), 4);
    }

    #[test]
    fn test_error_display_includes_status() {
        let err = DnnError::invalid_arguments("axis out of range");
        assert_eq!(err.to_string(), "status 2: axis out of range");
    }
}
