//! Writer statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time writer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Records accepted onto the queue.
    pub records_enqueued: u64,
    /// Records written to the sink.
    pub records_written: u64,
    /// Bytes written to the sink.
    pub bytes_written: u64,
    /// Batch writes performed.
    pub flushes: u64,
    /// Batch writes that failed after all attempts.
    pub write_errors: u64,
    /// Records lost with failed batches.
    pub records_dropped: u64,
    /// Successful rotations.
    pub rotations: u64,
    /// Items currently buffered in the queue.
    pub queue_depth: u64,
}

/// Shared counters behind `WriterStats`.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    records_enqueued: AtomicU64,
    records_written: AtomicU64,
    bytes_written: AtomicU64,
    flushes: AtomicU64,
    write_errors: AtomicU64,
    records_dropped: AtomicU64,
    rotations: AtomicU64,
}

impl StatsCounters {
    #[inline]
    pub fn record_enqueued(&self) {
        self.records_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_flush(&self, records: usize, bytes: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.records_written
            .fetch_add(records as u64, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self, records: usize) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
        self.records_dropped
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queue_depth: usize) -> WriterStats {
        WriterStats {
            records_enqueued: self.records_enqueued.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            queue_depth: queue_depth as u64,
        }
    }
}
