//! In-memory batch of records awaiting a sink write.

use bytes::{Bytes, BytesMut};

/// Records accumulated since the last flush, stored already concatenated.
///
/// Records are appended verbatim; no separator is inserted between them.
#[derive(Debug, Default)]
pub struct Batch {
    buf: BytesMut,
    records: usize,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a batch with room for `bytes` bytes before reallocating.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(bytes),
            records: 0,
        }
    }

    /// Appends one record.
    pub fn push(&mut self, record: &[u8]) {
        self.buf.extend_from_slice(record);
        self.records += 1;
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Total size of the batch in bytes.
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Empties the batch, returning its concatenated contents.
    pub fn take(&mut self) -> Bytes {
        self.records = 0;
        self.buf.split().freeze()
    }
}
