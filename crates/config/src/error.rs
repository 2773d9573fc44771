// SPDX-License-Identifier: Apache-2.0

//! Errors for pipeline configuration.
//!
//! Every configuration error is fatal at startup and names the offending
//! node so the operator can find it in the graph file.

use crate::NodeKind;

/// All errors that can occur loading, parsing or validating a pipeline
/// configuration.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The configuration file could not be read.
    #[error("failed to read config file `{path}`: {error}")]
    Io {
        /// The path passed on the command line.
        path: String,
        /// The underlying I/O error.
        error: std::io::Error,
    },

    /// The graph text could not be parsed.
    #[error("config parse error: {message}")]
    Parse {
        /// Parser diagnostic, with location information.
        message: String,
    },

    /// Only one level of subgraph nesting is accepted.
    #[error("subgraph `{subgraph}` is nested too deeply; only one level of nesting is supported")]
    SubgraphTooDeep {
        /// The offending subgraph name.
        subgraph: String,
    },

    /// The same node was declared twice.
    #[error("config graph already contains a node called `{node}`")]
    DuplicateNode {
        /// The duplicated node name.
        node: String,
    },

    /// An edge references a node that was never declared.
    #[error("edge `{from}` -> `{to}` references undeclared node `{node}`")]
    UndeclaredNode {
        /// Source endpoint of the edge.
        from: String,
        /// Destination endpoint of the edge.
        to: String,
        /// The endpoint that is not declared.
        node: String,
    },

    /// A node connects to itself.
    #[error("node `{node}` has a self-loop")]
    SelfLoop {
        /// The offending node.
        node: String,
    },

    /// No registered stage matches the node's `type` attribute.
    #[error("node `{node}` has unknown stage type `{type_tag}`")]
    UnknownStageType {
        /// The offending node.
        node: String,
        /// The unmatched `type` attribute value.
        type_tag: String,
    },

    /// The node kinds at the ends of an edge cannot be connected.
    #[error(
        "invalid edge `{from}` ({from_kind}) -> `{to}` ({to_kind}): {reason}"
    )]
    IncompatibleEdge {
        /// Source endpoint of the edge.
        from: String,
        /// Kind of the source endpoint.
        from_kind: NodeKind,
        /// Destination endpoint of the edge.
        to: String,
        /// Kind of the destination endpoint.
        to_kind: NodeKind,
        /// Why the connection is rejected.
        reason: String,
    },

    /// A transform is missing an in-edge or a normal out-edge.
    #[error("transform `{node}` must have at least one in-edge and one normal out-edge")]
    DanglingTransform {
        /// The offending transform node.
        node: String,
    },

    /// A sink declares more than one overflow out-edge.
    #[error("sink `{node}` has more than one overflow out-edge")]
    MultipleOverflow {
        /// The offending sink node.
        node: String,
    },

    /// The normal sub-graph contains a cycle.
    #[error("the pipeline graph has a cycle through node `{node}`")]
    NormalCycle {
        /// A node on the detected cycle.
        node: String,
    },

    /// The overflow edges form a cycle.
    #[error("overflow edges form a cycle through sink `{node}`")]
    OverflowCycle {
        /// A sink on the detected cycle.
        node: String,
    },

    /// A required node attribute is absent.
    #[error("node `{node}` is missing required attribute `{attribute}`")]
    MissingAttribute {
        /// The offending node.
        node: String,
        /// The absent attribute key.
        attribute: String,
    },

    /// A node attribute could not be interpreted.
    #[error("node `{node}` has invalid attribute `{attribute}`: {reason}")]
    InvalidAttribute {
        /// The offending node.
        node: String,
        /// The attribute key.
        attribute: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// An edge attribute could not be interpreted.
    #[error("edge `{from}` -> `{to}` has invalid attribute `{attribute}`: {reason}")]
    InvalidEdgeAttribute {
        /// Source endpoint of the edge.
        from: String,
        /// Destination endpoint of the edge.
        to: String,
        /// The attribute key.
        attribute: String,
        /// Why the value was rejected.
        reason: String,
    },
}
