//! The batching worker.
//!
//! A single background thread owns the sink. It drains the work queue in
//! order, accumulates records into a batch and writes the batch when it
//! grows past `buf_limit` records, when a flush is requested, before a
//! rotation, and at end-of-stream. Flush and rotate requests travel through
//! the same queue as records, so they take effect exactly between the
//! records submitted before and after them.

use crate::batch::Batch;
use crate::error::WriterError;
use crate::queue::{Dequeue, WorkQueue};
use crate::stats::StatsCounters;
use asynclog_rotate::{RotateError, RotatingSink};
use bytes::Bytes;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Callback receiving failures the worker cannot return to any caller.
///
/// Runs on the worker thread; it must not write to the same writer.
pub type ErrorHandler = Arc<dyn Fn(&WriterError) + Send + Sync>;

/// Items carried by the work queue.
pub(crate) enum Command {
    /// One formatted record.
    Record(Bytes),
    /// Write the pending batch and flush the sink, acknowledging if asked.
    Flush(Option<Sender<()>>),
    /// Write the pending batch, then rotate the sink.
    Rotate(Sender<Result<(), RotateError>>),
}

/// Batching and failure-handling knobs.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// A batch is written once it holds more than this many records.
    pub buf_limit: usize,
    /// Maximum age of a pending batch before it is written regardless of size.
    pub flush_interval: Option<Duration>,
    /// Extra attempts for a failed batch write.
    pub write_retries: u32,
    /// Pause between write attempts.
    pub retry_delay: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            buf_limit: 64,
            flush_interval: None,
            write_retries: 0,
            retry_delay: Duration::from_millis(10),
        }
    }
}

pub(crate) struct BatchingWorker<S: RotatingSink> {
    queue: Arc<WorkQueue<Command>>,
    sink: S,
    batch: Batch,
    /// When the oldest record in the current batch arrived.
    batch_started: Option<Instant>,
    options: WorkerOptions,
    stats: Arc<StatsCounters>,
    on_error: ErrorHandler,
}

impl<S: RotatingSink> BatchingWorker<S> {
    pub fn new(
        queue: Arc<WorkQueue<Command>>,
        sink: S,
        options: WorkerOptions,
        stats: Arc<StatsCounters>,
        on_error: ErrorHandler,
    ) -> Self {
        Self {
            queue,
            sink,
            batch: Batch::new(),
            batch_started: None,
            options,
            stats,
            on_error,
        }
    }

    /// Runs until the queue is closed and drained, then returns the sink.
    pub fn run(mut self) -> S {
        tracing::debug!(
            "Log writer started (buf_limit={}, queue_size={})",
            self.options.buf_limit,
            self.queue.capacity()
        );

        while let Some(command) = self.next_command() {
            self.handle(command);
        }

        self.flush_batch();
        self.flush_sink();

        tracing::debug!("Log writer stopped");
        self.sink
    }

    /// Waits for the next command, writing an aged batch in the meantime.
    fn next_command(&mut self) -> Option<Command> {
        loop {
            let deadline = match (self.options.flush_interval, self.batch_started) {
                (Some(interval), Some(started)) => started + interval,
                _ => return self.queue.dequeue_blocking(),
            };

            let wait = deadline.saturating_duration_since(Instant::now());
            match self.queue.dequeue_timeout(wait) {
                Dequeue::Item(command) => return Some(command),
                Dequeue::Timeout => self.flush_batch(),
                Dequeue::Closed => return None,
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Record(record) => {
                if self.batch.is_empty() {
                    self.batch_started = Some(Instant::now());
                }
                self.batch.push(&record);
                if self.batch.len() > self.options.buf_limit {
                    self.flush_batch();
                }
            }
            Command::Flush(ack) => {
                self.flush_batch();
                self.flush_sink();
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            Command::Rotate(reply) => {
                self.flush_batch();
                let result = self.sink.rotate();
                match &result {
                    Ok(()) => {
                        self.stats.record_rotation();
                        tracing::info!("Rotated log file");
                    }
                    Err(e) => tracing::warn!("Log rotation failed: {}", e),
                }
                let _ = reply.send(result);
            }
        }
    }

    /// Writes the pending batch. An empty batch is a no-op.
    ///
    /// A failed write is retried up to `write_retries` times; after that the
    /// batch is dropped and reported to the error handler.
    fn flush_batch(&mut self) {
        self.batch_started = None;
        if self.batch.is_empty() {
            return;
        }

        let records = self.batch.len();
        let buf = self.batch.take();
        let mut attempt = 0u32;

        loop {
            match self.sink.write(&buf) {
                Ok(()) => {
                    self.stats.record_flush(records, buf.len());
                    return;
                }
                Err(e) if attempt < self.options.write_retries && e.is_retryable() => {
                    attempt += 1;
                    tracing::warn!(
                        "Log batch write failed (attempt {}/{}): {}",
                        attempt,
                        self.options.write_retries + 1,
                        e
                    );
                    thread::sleep(self.options.retry_delay);
                }
                Err(e) => {
                    self.stats.record_dropped(records);
                    let err = WriterError::SinkWriteFailed {
                        records,
                        bytes: buf.len(),
                        source: e,
                    };
                    (self.on_error)(&err);
                    return;
                }
            }
        }
    }

    fn flush_sink(&mut self) {
        if let Err(e) = self.sink.flush() {
            (self.on_error)(&WriterError::SinkFlushFailed(e));
        }
    }
}
