//! # asynclog-rotate
//!
//! Rotating file sink for asynclog.
//!
//! This crate provides:
//! - The `RotatingSink` contract consumed by the batching writer
//! - A size-rotating log file with timestamped backups
//! - Backup retention by count and age, applied on a background thread
//! - Optional gzip compression of rotated backups

pub mod backup;
pub mod error;
pub mod file;
pub mod sink;

pub use backup::{Backup, BackupScanner, CleanupResult};
pub use error::RotateError;
pub use file::{RotateConfig, RotatingFile};
pub use sink::RotatingSink;

/// Default maximum log file size before rotation (100 MiB).
pub const DEFAULT_MAX_SIZE: u64 = 100 * 1024 * 1024;

/// Bytes per megabyte, as used by size settings expressed in MB.
pub const MEGABYTE: u64 = 1024 * 1024;
