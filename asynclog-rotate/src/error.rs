//! Rotation error types.

use thiserror::Error;

/// Errors that can occur while writing to or rotating a log file.
#[derive(Debug, Error)]
pub enum RotateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("write of {size} bytes exceeds maximum file size {max}")]
    WriteTooLarge { size: u64, max: u64 },

    #[error("invalid rotation config: {0}")]
    InvalidConfig(String),
}

impl RotateError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RotateError::Io(_))
    }
}
