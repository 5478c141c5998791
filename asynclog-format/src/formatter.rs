//! Level filtering and record encoding.

use crate::encoder::{ConsoleEncoder, EncoderConfig, Entry};
use crate::field::Field;
use crate::level::Level;
use bytes::Bytes;
use chrono::{Local, Utc};
use std::panic::Location;

/// Filters log calls by level and encodes the survivors into raw records.
#[derive(Debug, Clone)]
pub struct RecordFormatter {
    min_level: Level,
    encoder: ConsoleEncoder,
    name: Option<String>,
}

impl RecordFormatter {
    pub fn new(min_level: Level, config: EncoderConfig) -> Self {
        Self {
            min_level,
            encoder: ConsoleEncoder::new(config),
            name: None,
        }
    }

    /// Sets the logger name rendered under the name key.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn min_level(&self) -> Level {
        self.min_level
    }

    /// Returns whether records at `level` are emitted.
    #[inline]
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    /// Returns whether call sites should be captured for each record.
    pub fn captures_caller(&self) -> bool {
        !self.encoder.config().caller_key.is_empty()
    }

    /// Encodes a log call, or returns `None` when `level` is filtered out.
    pub fn format(
        &self,
        level: Level,
        message: &str,
        fields: &[Field],
        caller: Option<&Location<'_>>,
    ) -> Option<Bytes> {
        if !self.enabled(level) {
            return None;
        }

        let time = if self.encoder.config().utc {
            Utc::now().fixed_offset()
        } else {
            Local::now().fixed_offset()
        };
        let entry = Entry {
            level,
            time,
            name: self.name.as_deref(),
            caller,
            message,
        };
        Some(self.encoder.encode(&entry, fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_time() -> EncoderConfig {
        EncoderConfig::default().with_time_key("")
    }

    #[test]
    fn test_filters_below_min_level() {
        let formatter = RecordFormatter::new(Level::Warn, no_time());

        assert!(!formatter.enabled(Level::Info));
        assert!(formatter.enabled(Level::Warn));
        assert!(formatter.enabled(Level::Error));
        assert!(formatter.format(Level::Info, "dropped", &[], None).is_none());
    }

    #[test]
    fn test_format_emits_record() {
        let formatter = RecordFormatter::new(Level::Info, no_time()).with_name("api");
        let record = formatter
            .format(Level::Error, "failed", &[Field::int("code", 7)], None)
            .unwrap();
        assert_eq!(&record[..], b"error\tapi\tfailed\t{\"code\":7}\n");
    }

    #[test]
    fn test_captures_caller() {
        let formatter = RecordFormatter::new(Level::Info, no_time());
        assert!(!formatter.captures_caller());

        let formatter = RecordFormatter::new(Level::Info, no_time().with_caller_key("caller"));
        assert!(formatter.captures_caller());

        let here = Location::caller();
        let record = formatter.format(Level::Info, "m", &[], Some(here)).unwrap();
        let expected = format!("info\t{}:{}\tm\n", here.file(), here.line());
        assert_eq!(std::str::from_utf8(&record).unwrap(), expected);
    }

    #[test]
    fn test_utc_timestamps() {
        let mut config = EncoderConfig::default();
        config.utc = true;
        config.time_format = "%z".to_string();
        let formatter = RecordFormatter::new(Level::Info, config);

        let record = formatter.format(Level::Info, "m", &[], None).unwrap();
        assert!(record.starts_with(b"+0000\t"));
    }
}
