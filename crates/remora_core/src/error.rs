//! Error types for remote entity operations.

use remora_codec::CodecError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while operating on remote entities.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The remote service rejected or failed the operation.
    #[error("remote operation failed ({code}): {message}")]
    RemoteOperationFailed {
        /// Service error code.
        code: i32,
        /// Error message.
        message: String,
    },

    /// The call was made in a state where it is not allowed.
    #[error("precondition violated: {message}")]
    PreconditionViolation {
        /// What was violated.
        message: String,
    },

    /// A file payload exceeds the configured limit.
    #[error("file is {size} bytes, larger than the {limit} byte limit")]
    FileTooLarge {
        /// Payload size in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },

    /// A queued operation panicked.
    #[error("operation panicked: {message}")]
    OperationPanicked {
        /// Panic payload, if it was a string.
        message: String,
    },

    /// Encoding or field-operation error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl CoreError {
    /// Creates a remote failure.
    pub fn remote(code: i32, message: impl Into<String>) -> Self {
        Self::RemoteOperationFailed {
            code,
            message: message.into(),
        }
    }

    /// Creates a precondition violation.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionViolation {
            message: message.into(),
        }
    }

    /// Returns true if this is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled)
    }
}
