// SPDX-License-Identifier: Apache-2.0

//! JSON line formatter.

use super::Formatter;
use loggraph_engine::StageError;
use loggraph_record::Record;

/// Renders the record fields as one JSON object per line, with the
/// monotonic timestamp injected under `timestamp`.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, record: &Record) -> Result<Vec<u8>, StageError> {
        let mut object = serde_json::Map::with_capacity(record.fields.len() + 1);
        let _ = object.insert(
            "timestamp".to_owned(),
            serde_json::Value::from(record.mono_timestamp),
        );
        for (key, value) in &record.fields {
            let _ = object.insert(key.clone(), serde_json::to_value(value)?);
        }
        Ok(serde_json::to_vec(&serde_json::Value::Object(object))?)
    }
}

#[cfg(test)]
mod tests {
    #![allow(missing_docs)]
    use super::*;
    use loggraph_record::Value;

    #[test]
    fn renders_fields_and_timestamp() {
        let mut record = Record::from_message("hello");
        let _ = record.fields.insert("count".to_owned(), Value::Int(2));

        let line = JsonFormatter.format(&record).expect("format");
        let parsed: serde_json::Value = serde_json::from_slice(&line).expect("valid json");
        assert_eq!(parsed["message"], "hello");
        assert_eq!(parsed["count"], 2);
        assert!(parsed["timestamp"].is_i64());
    }
}
