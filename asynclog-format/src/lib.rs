//! # asynclog-format
//!
//! Turns leveled log calls into raw byte records.
//!
//! This crate provides:
//! - A closed set of severity levels used for filtering
//! - Structured key/value fields
//! - A console encoder with configurable element keys
//! - A formatter that drops records below a minimum level

pub mod encoder;
pub mod field;
pub mod formatter;
pub mod level;

pub use encoder::{ConsoleEncoder, EncoderConfig, Entry, LevelEncoding};
pub use field::Field;
pub use formatter::RecordFormatter;
pub use level::{Level, ParseLevelError};
