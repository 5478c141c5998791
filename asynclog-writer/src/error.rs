//! Writer error types.

use crate::config::ConfigError;
use asynclog_rotate::RotateError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the asynchronous writer.
#[derive(Debug, Error)]
pub enum WriterError {
    /// A record or request was submitted after `close`.
    #[error("work queue is closed")]
    QueueClosed,

    #[error("queue still full after {0:?}")]
    EnqueueTimeout(Duration),

    /// The sink rejected a batch. The batch has been dropped.
    #[error("sink write failed, dropped {records} records ({bytes} bytes): {source}")]
    SinkWriteFailed {
        records: usize,
        bytes: usize,
        #[source]
        source: RotateError,
    },

    #[error("sink flush failed: {0}")]
    SinkFlushFailed(#[source] RotateError),

    #[error("rotation failed: {0}")]
    RotationFailed(#[source] RotateError),

    #[error("writer worker panicked")]
    WorkerPanicked,

    #[error("sink error: {0}")]
    Sink(#[from] RotateError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WriterError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WriterError::EnqueueTimeout(_) => true,
            WriterError::SinkWriteFailed { source, .. }
            | WriterError::SinkFlushFailed(source)
            | WriterError::RotationFailed(source) => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<WriterError> for std::io::Error {
    fn from(err: WriterError) -> Self {
        use std::io::ErrorKind;

        let kind = match &err {
            WriterError::QueueClosed => ErrorKind::BrokenPipe,
            WriterError::EnqueueTimeout(_) => ErrorKind::TimedOut,
            WriterError::Io(e) => e.kind(),
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(WriterError::EnqueueTimeout(Duration::from_millis(5)).is_retryable());
        assert!(!WriterError::QueueClosed.is_retryable());

        let io = RotateError::Io(std::io::Error::new(std::io::ErrorKind::Other, "full"));
        assert!(WriterError::RotationFailed(io).is_retryable());

        let too_large = RotateError::WriteTooLarge { size: 10, max: 5 };
        let err = WriterError::SinkWriteFailed {
            records: 1,
            bytes: 10,
            source: too_large,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_into_io_error() {
        let err: std::io::Error = WriterError::QueueClosed.into();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);

        let err: std::io::Error = WriterError::EnqueueTimeout(Duration::from_secs(1)).into();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }
}
