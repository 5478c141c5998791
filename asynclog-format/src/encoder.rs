//! Console encoder.
//!
//! Produces one human-readable line per record:
//!
//! ```text
//! 2024-03-09T07:05:03.042+0100	info	api	src/main.rs:42	request served	{"status":200}
//! ```
//!
//! Each leading element is emitted only when its key is configured; the
//! trailing JSON object is emitted only when the record has fields.

use crate::field::Field;
use crate::level::Level;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write;
use std::panic::Location;

/// How the level element is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelEncoding {
    /// `info`
    #[default]
    Lowercase,
    /// `INFO`
    Capital,
}

/// Encoder configuration. An empty key omits that element from the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub message_key: String,
    pub level_key: String,
    pub time_key: String,
    pub name_key: String,
    /// Non-empty enables call-site capture.
    pub caller_key: String,
    pub line_ending: String,
    pub separator: String,
    /// chrono `strftime` layout for the time element.
    pub time_format: String,
    pub level_encoding: LevelEncoding,
    /// Stamp records in UTC instead of local time.
    pub utc: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            message_key: "msg".to_string(),
            level_key: "level".to_string(),
            time_key: "ts".to_string(),
            name_key: "logger".to_string(),
            caller_key: String::new(),
            line_ending: "\n".to_string(),
            separator: "\t".to_string(),
            time_format: "%Y-%m-%dT%H:%M:%S%.3f%z".to_string(),
            level_encoding: LevelEncoding::Lowercase,
            utc: false,
        }
    }
}

impl EncoderConfig {
    pub fn with_caller_key(mut self, key: impl Into<String>) -> Self {
        self.caller_key = key.into();
        self
    }

    pub fn with_time_key(mut self, key: impl Into<String>) -> Self {
        self.time_key = key.into();
        self
    }

    pub fn with_level_encoding(mut self, encoding: LevelEncoding) -> Self {
        self.level_encoding = encoding;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }
}

/// The non-field parts of a record.
#[derive(Debug, Clone)]
pub struct Entry<'a> {
    pub level: Level,
    pub time: DateTime<FixedOffset>,
    pub name: Option<&'a str>,
    pub caller: Option<&'a Location<'a>>,
    pub message: &'a str,
}

/// Encodes entries in the console layout.
#[derive(Debug, Clone)]
pub struct ConsoleEncoder {
    config: EncoderConfig,
}

impl ConsoleEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encodes one record, including the line ending.
    pub fn encode(&self, entry: &Entry<'_>, fields: &[Field]) -> Bytes {
        let cfg = &self.config;
        let mut out = String::with_capacity(128 + entry.message.len());
        let mut elements = 0usize;

        let mut begin = |out: &mut String| {
            if elements > 0 {
                out.push_str(&cfg.separator);
            }
            elements += 1;
        };

        if !cfg.time_key.is_empty() {
            begin(&mut out);
            let _ = write!(out, "{}", entry.time.format(&cfg.time_format));
        }
        if !cfg.level_key.is_empty() {
            begin(&mut out);
            out.push_str(match cfg.level_encoding {
                LevelEncoding::Lowercase => entry.level.as_str(),
                LevelEncoding::Capital => entry.level.as_capital_str(),
            });
        }
        if let (false, Some(name)) = (cfg.name_key.is_empty(), entry.name) {
            begin(&mut out);
            out.push_str(name);
        }
        if let (false, Some(caller)) = (cfg.caller_key.is_empty(), entry.caller) {
            begin(&mut out);
            let _ = write!(out, "{}:{}", caller.file(), caller.line());
        }
        if !cfg.message_key.is_empty() {
            begin(&mut out);
            out.push_str(entry.message);
        }
        if !fields.is_empty() {
            begin(&mut out);
            encode_fields(&mut out, fields);
        }

        out.push_str(&cfg.line_ending);
        Bytes::from(out)
    }
}

/// Writes fields as a JSON object, keeping their order and duplicates.
fn encode_fields(out: &mut String, fields: &[Field]) {
    out.push('{');
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let key = Value::String(field.key.to_string());
        let _ = write!(out, "{}:{}", key, field.value);
    }
    out.push('}');
}
