// SPDX-License-Identifier: Apache-2.0

//! Human-oriented line formatter.

use super::Formatter;
use loggraph_engine::StageError;
use loggraph_record::{MESSAGE_FIELD, Record};

/// Renders the payload first, then the remaining fields as `key=value`
/// pairs in key order.
pub struct ConsoleFormatter;

impl Formatter for ConsoleFormatter {
    fn format(&self, record: &Record) -> Result<Vec<u8>, StageError> {
        let mut parts = Vec::with_capacity(record.fields.len());
        if let Some(message) = record.message() {
            parts.push(message.to_string());
        }

        let mut keys: Vec<&String> = record
            .fields
            .keys()
            .filter(|k| k.as_str() != MESSAGE_FIELD)
            .collect();
        keys.sort();
        for key in keys {
            parts.push(format!("{key}={}", record.fields[key]));
        }

        Ok(parts.join(" ").into_bytes())
    }
}

#[cfg(test)]
mod tests {
    #![allow(missing_docs)]
    use super::*;
    use loggraph_record::Value;

    #[test]
    fn message_leads_then_sorted_fields() {
        let mut record = Record::from_message("boom");
        let _ = record.fields.insert("b".to_owned(), Value::Int(2));
        let _ = record.fields.insert("a".to_owned(), Value::from("x"));

        let line = ConsoleFormatter.format(&record).expect("format");
        assert_eq!(String::from_utf8(line).expect("utf8"), "boom a=x b=2");
    }

    #[test]
    fn record_without_message_renders_fields_only() {
        let mut record = Record::new();
        let _ = record.fields.insert("k".to_owned(), Value::from("v"));
        let line = ConsoleFormatter.format(&record).expect("format");
        assert_eq!(String::from_utf8(line).expect("utf8"), "k=v");
    }
}
