// SPDX-License-Identifier: Apache-2.0

//! Formatters used by the writing sinks.
//!
//! A formatter renders one record as a line of bytes, without the trailing
//! delimiter. The `format` attribute of a sink selects the implementation.

mod console;
mod json;

pub use console::ConsoleFormatter;
pub use json::JsonFormatter;

use loggraph_config::NodeSpec;
use loggraph_engine::StageError;
use loggraph_record::Record;

/// Renders records for a byte-oriented sink.
pub trait Formatter: Send + Sync {
    /// Renders one record, without a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error when the record cannot be rendered; the sink logs
    /// it and skips the record.
    fn format(&self, record: &Record) -> Result<Vec<u8>, StageError>;
}

/// Resolves the `format` attribute of a sink node, defaulting to `json`.
///
/// # Errors
///
/// Returns a configuration error naming the node for an unknown format.
pub fn formatter_from_node(node: &NodeSpec) -> Result<Box<dyn Formatter>, loggraph_config::Error> {
    match node.attr("format").unwrap_or("json") {
        "json" => Ok(Box::new(JsonFormatter)),
        "console" => Ok(Box::new(ConsoleFormatter)),
        other => Err(loggraph_config::Error::InvalidAttribute {
            node: node.name.clone(),
            attribute: "format".to_owned(),
            reason: format!("no formatter named `{other}` found"),
        }),
    }
}
