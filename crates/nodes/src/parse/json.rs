// SPDX-License-Identifier: Apache-2.0

//! Parser for line-delimited JSON objects.

use super::Parser;
use loggraph_engine::StageError;
use loggraph_record::{Record, Value};

/// Interprets each line as one JSON object whose members become record
/// fields. Nested values are kept as their JSON text.
pub struct JsonParser;

impl Parser for JsonParser {
    fn parse(&self, line: &[u8]) -> Result<Record, StageError> {
        let parsed: serde_json::Value = serde_json::from_slice(line)?;
        let serde_json::Value::Object(members) = parsed else {
            return Err(format!(
                "expected a JSON object, got {}",
                json_type_name(&parsed)
            )
            .into());
        };

        let mut record = Record::new();
        for (key, value) in members {
            let _ = record.fields.insert(key, json_to_value(value));
        }
        Ok(record)
    }
}

fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
            Value::String(nested.to_string())
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    #![allow(missing_docs)]
    use super::*;

    #[test]
    fn object_members_become_fields() {
        let record = JsonParser
            .parse(br#"{"message":"hi","level":"info","count":3,"ok":true}"#)
            .expect("parse");
        assert_eq!(record.message(), Some(&Value::String("hi".into())));
        assert_eq!(record.fields.get("level"), Some(&Value::String("info".into())));
        assert_eq!(record.fields.get("count"), Some(&Value::Int(3)));
        assert_eq!(record.fields.get("ok"), Some(&Value::Bool(true)));
    }

    #[test]
    fn nested_values_are_kept_as_text() {
        let record = JsonParser
            .parse(br#"{"tags":["a","b"]}"#)
            .expect("parse");
        assert_eq!(
            record.fields.get("tags"),
            Some(&Value::String("[\"a\",\"b\"]".into()))
        );
    }

    #[test]
    fn non_object_payload_is_an_error() {
        assert!(JsonParser.parse(b"[1,2,3]").is_err());
        assert!(JsonParser.parse(b"not json at all").is_err());
    }
}
