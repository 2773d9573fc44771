// SPDX-License-Identifier: Apache-2.0

//! Line parsers used by stream sources.
//!
//! A parser turns one received line into a record. The `parser` attribute
//! of a source selects the implementation.

mod json;
mod newline;

pub use json::JsonParser;
pub use newline::NewlineParser;

use loggraph_config::NodeSpec;
use loggraph_engine::StageError;
use loggraph_record::Record;
use std::sync::Arc;

/// Turns raw line payloads into records.
pub trait Parser: Send + Sync {
    /// Parses one line, excluding its delimiter.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload cannot be interpreted; the source
    /// logs it and skips the line.
    fn parse(&self, line: &[u8]) -> Result<Record, StageError>;
}

/// Resolves the `parser` attribute of a source node, defaulting to
/// `newline`.
///
/// # Errors
///
/// Returns a configuration error naming the node for an unknown parser.
pub fn parser_from_node(node: &NodeSpec) -> Result<Arc<dyn Parser>, loggraph_config::Error> {
    match node.attr("parser").unwrap_or("newline") {
        "newline" => Ok(Arc::new(NewlineParser)),
        "json" => Ok(Arc::new(JsonParser)),
        other => Err(loggraph_config::Error::InvalidAttribute {
            node: node.name.clone(),
            attribute: "parser".to_owned(),
            reason: format!("no parser named `{other}` found"),
        }),
    }
}
