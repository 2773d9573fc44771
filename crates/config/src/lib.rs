// SPDX-License-Identifier: Apache-2.0

//! Configuration model for the pipeline graph.
//!
//! Operators describe a pipeline as a directed graph in a DOT-subset text
//! language: vertices are named stages carrying a `type` attribute plus
//! stage-specific key/value attributes, and edges declare dataflow. An edge
//! with `type="Buffer"` is an overflow link; every other edge carries live
//! traffic.

pub mod error;
mod parser;
mod validate;

pub use error::Error;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default bounded capacity of the channel allocated for an edge.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;

/// The role a stage plays in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A stage with no in-edges that produces batches.
    Source,
    /// A stage that filters or mutates batches in flight.
    Transform,
    /// A stage with no normal out-edges that terminates dataflow.
    Sink,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeKind::Source => "source",
            NodeKind::Transform => "transform",
            NodeKind::Sink => "sink",
        };
        f.write_str(label)
    }
}

/// Whether an edge carries live traffic or abandoned sink buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// Live traffic.
    Normal,
    /// Batches a sink has abandoned after persistent failure.
    Overflow,
}

/// One declared stage.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    /// The node name, unique across the graph.
    pub name: String,
    /// The registry key selecting the stage implementation.
    pub type_tag: String,
    /// Remaining stage-specific attributes, uninterpreted.
    pub attrs: HashMap<String, String>,
}

impl NodeSpec {
    /// Looks up an attribute value.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Looks up an attribute that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAttribute`] naming this node.
    pub fn require_attr(&self, key: &str) -> Result<&str, Error> {
        self.attr(key).ok_or_else(|| Error::MissingAttribute {
            node: self.name.clone(),
            attribute: key.to_owned(),
        })
    }

    /// Parses an optional attribute with [`std::str::FromStr`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAttribute`] when the value does not parse.
    pub fn parse_attr<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.attr(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|e| {
                Error::InvalidAttribute {
                    node: self.name.clone(),
                    attribute: key.to_owned(),
                    reason: e.to_string(),
                }
            }),
        }
    }

    /// Parses an optional duration attribute in `humantime` form
    /// (e.g. `100ms`, `10s`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAttribute`] when the value does not parse.
    pub fn duration_attr(&self, key: &str) -> Result<Option<Duration>, Error> {
        match self.attr(key) {
            None => Ok(None),
            Some(raw) => humantime::parse_duration(raw).map(Some).map_err(|e| {
                Error::InvalidAttribute {
                    node: self.name.clone(),
                    attribute: key.to_owned(),
                    reason: e.to_string(),
                }
            }),
        }
    }
}

/// One declared edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSpec {
    /// Name of the producing node.
    pub from: String,
    /// Name of the consuming node.
    pub to: String,
    /// Normal or overflow link.
    pub link_type: LinkType,
    /// Channel capacity override for this edge.
    pub capacity: Option<usize>,
}

impl EdgeSpec {
    /// The bounded capacity of the channel backing this edge.
    #[must_use]
    pub fn channel_capacity(&self) -> usize {
        self.capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// A parsed pipeline graph, prior to validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSpec {
    /// Declared nodes, keyed by name.
    pub nodes: BTreeMap<String, NodeSpec>,
    /// Declared edges, in declaration order.
    pub edges: Vec<EdgeSpec>,
    /// Graph-level attributes, uninterpreted by the runtime.
    pub attrs: HashMap<String, String>,
}

impl PipelineSpec {
    /// Parses a pipeline graph from its textual form.
    ///
    /// # Errors
    ///
    /// Returns a parse or structural [`Error`] naming the offending element.
    pub fn parse(text: &str) -> Result<Self, Error> {
        parser::parse(text)
    }

    /// Reads and parses a pipeline graph file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be read, otherwise any
    /// parse error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|error| Error::Io {
            path: path.display().to_string(),
            error,
        })?;
        Self::parse(&text)
    }

    /// Validates the graph structure and resolves each node to a kind.
    ///
    /// `resolve` maps a node to the kind of its registered stage type, or
    /// `None` when no stage matches. Checks: edge endpoints exist, kind
    /// compatibility (source→{transform,sink}, transform→{transform,sink},
    /// sink→sink only via overflow), no self-loops, at most one overflow
    /// out-edge per sink, the normal sub-graph is acyclic, and overflow
    /// edges form no cycle.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule as an [`Error`] naming the node.
    pub fn validate<F>(&self, resolve: F) -> Result<BTreeMap<String, NodeKind>, Error>
    where
        F: Fn(&NodeSpec) -> Option<NodeKind>,
    {
        validate::validate(self, resolve)
    }

    /// Edges leaving `node`, normal links only.
    #[must_use]
    pub fn normal_out_edges(&self, node: &str) -> Vec<&EdgeSpec> {
        self.edges
            .iter()
            .filter(|e| e.from == node && e.link_type == LinkType::Normal)
            .collect()
    }

    /// The overflow edge leaving `node`, if declared.
    #[must_use]
    pub fn overflow_out_edge(&self, node: &str) -> Option<&EdgeSpec> {
        self.edges
            .iter()
            .find(|e| e.from == node && e.link_type == LinkType::Overflow)
    }

    /// Edges arriving at `node`, any link type.
    #[must_use]
    pub fn in_edges(&self, node: &str) -> Vec<&EdgeSpec> {
        self.edges.iter().filter(|e| e.to == node).collect()
    }
}
