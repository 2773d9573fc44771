// SPDX-License-Identifier: Apache-2.0

//! Parser treating each line as an opaque payload.

use super::Parser;
use loggraph_engine::StageError;
use loggraph_record::Record;

/// Puts the whole line, lossily decoded as UTF-8, under the `message` key.
pub struct NewlineParser;

impl Parser for NewlineParser {
    fn parse(&self, line: &[u8]) -> Result<Record, StageError> {
        Ok(Record::from_message(String::from_utf8_lossy(line)))
    }
}

#[cfg(test)]
mod tests {
    #![allow(missing_docs)]
    use super::*;
    use loggraph_record::Value;

    #[test]
    fn line_becomes_message_field() {
        let record = NewlineParser.parse(b"a plain line").expect("parse");
        assert_eq!(record.message(), Some(&Value::String("a plain line".into())));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let record = NewlineParser.parse(&[0x66, 0xff, 0x6f]).expect("parse");
        assert!(record.message().is_some());
    }
}
