//! The sink contract consumed by the batching writer.

use crate::error::RotateError;

/// An append-only byte sink that can rotate its underlying file.
///
/// Implementations are owned by a single writer thread, so methods take
/// `&mut self` and need no internal locking.
pub trait RotatingSink: Send + 'static {
    /// Appends `buf` in full. May rotate first if a size threshold is reached.
    ///
    /// An empty buffer is a no-op and must not fail.
    fn write(&mut self, buf: &[u8]) -> Result<(), RotateError>;

    /// Closes the current file and starts a new one.
    fn rotate(&mut self) -> Result<(), RotateError>;

    /// Flushes buffered data to the operating system.
    fn flush(&mut self) -> Result<(), RotateError> {
        Ok(())
    }
}

impl<S: RotatingSink + ?Sized> RotatingSink for Box<S> {
    fn write(&mut self, buf: &[u8]) -> Result<(), RotateError> {
        (**self).write(buf)
    }

    fn rotate(&mut self) -> Result<(), RotateError> {
        (**self).rotate()
    }

    fn flush(&mut self) -> Result<(), RotateError> {
        (**self).flush()
    }
}
