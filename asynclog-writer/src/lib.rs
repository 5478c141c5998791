//! # asynclog-writer
//!
//! Asynchronous, batching log writer.
//!
//! Producers hand formatted records to a bounded queue and return; a single
//! background worker accumulates them and writes whole batches to a rotating
//! sink. This crate provides:
//! - A bounded FIFO work queue with backpressure
//! - The batching worker, the only code that touches the sink
//! - The `AsyncLogWriter` façade with level-aware logging, flush and rotation
//! - YAML/environment configuration
//!
//! ## Durability
//!
//! A successful `write` means the record is queued, not that it is on disk.
//! Records are lost if the sink rejects a batch (the batch is dropped and
//! reported to the error handler) or if the process dies before `close`
//! drains the queue. Use `flush` for a barrier and `close` before exit.

pub mod batch;
pub mod config;
pub mod error;
pub mod queue;
pub mod stats;
pub mod worker;
pub mod writer;

pub use asynclog_format::{Field, Level};
pub use batch::Batch;
pub use config::{Config, ConfigError, FileConfig, WriterConfig};
pub use error::WriterError;
pub use queue::{Dequeue, WorkQueue};
pub use stats::WriterStats;
pub use worker::{ErrorHandler, WorkerOptions};
pub use writer::{AsyncLogWriter, WriterBuilder, WriterState};

#[cfg(test)]
mod testing;
