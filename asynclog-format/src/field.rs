//! Structured key/value fields attached to a log record.

use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;

/// A single structured field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: Cow<'static, str>,
    pub value: Value,
}

impl Field {
    pub fn new(key: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn string(key: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        Self::new(key, Value::String(value.into()))
    }

    pub fn int(key: impl Into<Cow<'static, str>>, value: i64) -> Self {
        Self::new(key, value)
    }

    pub fn uint(key: impl Into<Cow<'static, str>>, value: u64) -> Self {
        Self::new(key, value)
    }

    /// Non-finite floats are encoded as strings, since JSON has no form for them.
    pub fn float(key: impl Into<Cow<'static, str>>, value: f64) -> Self {
        match serde_json::Number::from_f64(value) {
            Some(n) => Self::new(key, Value::Number(n)),
            None => Self::new(key, Value::String(value.to_string())),
        }
    }

    pub fn bool(key: impl Into<Cow<'static, str>>, value: bool) -> Self {
        Self::new(key, value)
    }

    /// Serializes any value into a field.
    ///
    /// If serialization fails, the field is renamed to `<key>Error` and
    /// carries the error message instead.
    pub fn any<T: Serialize + ?Sized>(key: impl Into<Cow<'static, str>>, value: &T) -> Self {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => Self { key, value },
            Err(e) => Self {
                key: Cow::Owned(format!("{}Error", key)),
                value: Value::String(e.to_string()),
            },
        }
    }

    /// Attaches an error's message under the `error` key.
    pub fn error(err: &dyn std::error::Error) -> Self {
        Self::string("error", err.to_string())
    }
}
