//! The asynchronous log writer façade.

use crate::config::Config;
use crate::error::WriterError;
use crate::queue::WorkQueue;
use crate::stats::{StatsCounters, WriterStats};
use crate::worker::{BatchingWorker, Command, ErrorHandler, WorkerOptions};
use asynclog_format::{Field, Level, RecordFormatter};
use asynclog_rotate::{RotatingFile, RotatingSink};
use bytes::Bytes;
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::io;
use std::panic::Location;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

/// Lifecycle state of a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// The worker is running and writes are accepted.
    Running,
    /// The queue is closed; the worker has drained it and exited.
    Stopped,
}

/// Builder for `AsyncLogWriter`.
pub struct WriterBuilder {
    config: Config,
    sink: Option<Box<dyn RotatingSink>>,
    on_error: Option<ErrorHandler>,
    name: Option<String>,
}

impl WriterBuilder {
    /// Writes to `sink` instead of the rotating file named in the config.
    pub fn sink(mut self, sink: impl RotatingSink) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Receives sink failures that no caller can be told about.
    ///
    /// Defaults to logging them at error level.
    pub fn on_error(mut self, handler: impl Fn(&WriterError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Logger name rendered into formatted records.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Validates the config, opens the sink and starts the worker.
    pub fn build(self) -> Result<AsyncLogWriter, WriterError> {
        let config = self.config;
        config.validate()?;

        let sink: Box<dyn RotatingSink> = match self.sink {
            Some(sink) => sink,
            None => Box::new(RotatingFile::new(config.file.rotate_config())?),
        };
        let on_error = self.on_error.unwrap_or_else(|| {
            Arc::new(|err: &WriterError| tracing::error!("Log writer error: {}", err))
        });

        let mut formatter = RecordFormatter::new(config.level, config.encoder.clone());
        if let Some(name) = self.name {
            formatter = formatter.with_name(name);
        }

        let queue = Arc::new(WorkQueue::new(config.writer.queue_size));
        let stats = Arc::new(StatsCounters::default());
        let options = WorkerOptions {
            buf_limit: config.writer.buf_limit,
            flush_interval: config.writer.flush_interval(),
            write_retries: config.writer.write_retries,
            retry_delay: config.writer.retry_delay(),
        };

        let worker = BatchingWorker::new(queue.clone(), sink, options, stats.clone(), on_error);
        let handle = thread::Builder::new()
            .name("asynclog-writer".to_string())
            .spawn(move || drop(worker.run()))?;
        let worker_id = handle.thread().id();

        tracing::info!(
            "Log writer started: {} (queue_size={}, buf_limit={})",
            config.file.path.display(),
            config.writer.queue_size,
            config.writer.buf_limit
        );

        Ok(AsyncLogWriter {
            queue,
            formatter,
            worker: Mutex::new(Some(handle)),
            worker_id,
            stats,
            enqueue_timeout: config.writer.enqueue_timeout(),
        })
    }
}

/// Asynchronous, batching log writer.
///
/// Producer calls only enqueue; a background worker owns the sink and writes
/// records in batches. All methods take `&self` and may be called from any
/// thread. See the crate docs for the durability caveat.
pub struct AsyncLogWriter {
    queue: Arc<WorkQueue<Command>>,
    formatter: RecordFormatter,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    stats: Arc<StatsCounters>,
    enqueue_timeout: Option<Duration>,
}

impl AsyncLogWriter {
    /// Creates a writer for the rotating file described by `config`.
    pub fn new(config: Config) -> Result<Self, WriterError> {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> WriterBuilder {
        WriterBuilder {
            config,
            sink: None,
            on_error: None,
            name: None,
        }
    }

    fn enqueue(&self, command: Command) -> Result<(), WriterError> {
        // The worker must never wait on its own queue. This happens when the
        // writer backs the tracing subscriber the worker logs through.
        if thread::current().id() == self.worker_id {
            return self.queue.enqueue_timeout(command, Duration::ZERO);
        }
        match self.enqueue_timeout {
            Some(timeout) => self.queue.enqueue_timeout(command, timeout),
            None => self.queue.enqueue(command),
        }
    }

    fn enqueue_record(&self, record: Bytes) -> Result<(), WriterError> {
        self.enqueue(Command::Record(record))?;
        self.stats.record_enqueued();
        Ok(())
    }

    /// Queues a copy of `buf` as one record.
    ///
    /// Blocks while the queue is full. Returns the number of bytes accepted,
    /// which is always all of them.
    pub fn write(&self, buf: &[u8]) -> Result<usize, WriterError> {
        self.enqueue_record(Bytes::copy_from_slice(buf))?;
        Ok(buf.len())
    }

    /// Formats and queues a log call, unless `level` is filtered out.
    #[track_caller]
    pub fn log(&self, level: Level, message: &str, fields: &[Field]) -> Result<(), WriterError> {
        if !self.formatter.enabled(level) {
            return Ok(());
        }
        let caller = self
            .formatter
            .captures_caller()
            .then(Location::caller);
        match self.formatter.format(level, message, fields, caller) {
            Some(record) => self.enqueue_record(record),
            None => Ok(()),
        }
    }

    #[track_caller]
    pub fn info(&self, message: &str, fields: &[Field]) -> Result<(), WriterError> {
        self.log(Level::Info, message, fields)
    }

    #[track_caller]
    pub fn warn(&self, message: &str, fields: &[Field]) -> Result<(), WriterError> {
        self.log(Level::Warn, message, fields)
    }

    #[track_caller]
    pub fn error(&self, message: &str, fields: &[Field]) -> Result<(), WriterError> {
        self.log(Level::Error, message, fields)
    }

    /// Asks the worker to write its pending batch. Does not wait for it.
    ///
    /// Records queued before this call are written no later than the records
    /// queued after it.
    pub fn sync(&self) -> Result<(), WriterError> {
        self.enqueue(Command::Flush(None))
    }

    /// Writes and flushes everything queued before this call, waiting until done.
    ///
    /// A batch the sink rejects is still reported to the error handler, not here.
    pub fn flush(&self) -> Result<(), WriterError> {
        let (ack_tx, ack_rx) = bounded(1);
        self.enqueue(Command::Flush(Some(ack_tx)))?;
        ack_rx.recv().map_err(|_| WriterError::WorkerPanicked)
    }

    /// Rotates the sink, after writing everything queued before this call.
    pub fn rotate(&self) -> Result<(), WriterError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.enqueue(Command::Rotate(reply_tx))?;
        match reply_rx.recv() {
            Ok(result) => result.map_err(WriterError::RotationFailed),
            Err(_) => Err(WriterError::WorkerPanicked),
        }
    }

    /// Stops accepting writes, drains the queue, writes the final batch and
    /// waits for the worker to exit. Later calls return immediately.
    pub fn close(&self) -> Result<(), WriterError> {
        self.queue.close();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            handle.join().map_err(|_| WriterError::WorkerPanicked)?;
            tracing::debug!("Log writer closed");
        }
        Ok(())
    }

    pub fn state(&self) -> WriterState {
        if self.queue.is_closed() && self.worker.lock().is_none() {
            WriterState::Stopped
        } else {
            WriterState::Running
        }
    }

    /// Returns the current statistics.
    pub fn stats(&self) -> WriterStats {
        self.stats.snapshot(self.queue.len())
    }

    pub fn formatter(&self) -> &RecordFormatter {
        &self.formatter
    }
}

impl Drop for AsyncLogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Failed to close log writer: {}", e);
        }
    }
}

impl io::Write for &AsyncLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        AsyncLogWriter::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sync().map_err(io::Error::from)
    }
}

impl io::Write for AsyncLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        AsyncLogWriter::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sync().map_err(io::Error::from)
    }
}

impl<'a> MakeWriter<'a> for AsyncLogWriter {
    type Writer = &'a AsyncLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}
