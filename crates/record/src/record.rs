// SPDX-License-Identifier: Apache-2.0

//! A single structured log record.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

/// The distinguished field holding the primary payload of a record.
///
/// Sources normalize vendor-specific keys (e.g. a journal `MESSAGE` field)
/// onto this key.
pub const MESSAGE_FIELD: &str = "message";

/// Anchor for the monotonic clock. All record timestamps are nanoseconds
/// elapsed since the first timestamp taken in this process.
static CLOCK_ANCHOR: Lazy<Instant> = Lazy::new(Instant::now);

/// Returns the current monotonic time in nanoseconds.
///
/// Wall-clock time is never used by the pipeline runtime.
#[must_use]
pub fn mono_now() -> i64 {
    CLOCK_ANCHOR.elapsed().as_nanos() as i64
}

/// A dynamically-typed field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// A UTF-8 string.
    String(String),
    /// A signed 64-bit integer.
    Int(i64),
    /// A 64-bit float.
    Float(f64),
    /// A boolean.
    Bool(bool),
    /// An explicit null.
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// One log line as structured key/value data.
///
/// Records are logically value types. A stage may mutate `fields` only while
/// it owns the batch containing the record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Monotonic timestamp in nanoseconds, taken at ingestion.
    pub mono_timestamp: i64,
    /// Parsed fields of the record.
    pub fields: HashMap<String, Value>,
}

impl Record {
    /// Creates an empty record stamped with the current monotonic time.
    #[must_use]
    pub fn new() -> Self {
        Record {
            mono_timestamp: mono_now(),
            fields: HashMap::new(),
        }
    }

    /// Creates a record carrying only the given message payload.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        let mut record = Record::new();
        let _ = record
            .fields
            .insert(MESSAGE_FIELD.to_owned(), Value::String(message.into()));
        record
    }

    /// Returns the primary payload, if set.
    #[must_use]
    pub fn message(&self) -> Option<&Value> {
        self.fields.get(MESSAGE_FIELD)
    }

    /// Clears all fields and restamps the timestamp, readying the record for
    /// reuse.
    pub fn reset(&mut self) {
        self.fields.clear();
        self.mono_timestamp = mono_now();
    }
}

impl Default for Record {
    fn default() -> Self {
        Record::new()
    }
}
