// SPDX-License-Identifier: Apache-2.0

//! Pipeline runtime.
//!
//! The runtime materializes a configured graph into independent stage
//! drivers (sources, transforms, sinks) connected by bounded channels,
//! drives them until shutdown, and guarantees that every record accepted
//! before `kill()` reaches a terminal state.
//!
//! Stage implementations are plugins: they implement one of the capability
//! traits ([`Source`], [`Transform`], [`Sink`]) and register a factory in
//! the matching distributed slice. The graph builder resolves `type`
//! attributes against those registries.

use loggraph_config::{NodeKind, NodeSpec};
pub use linkme::distributed_slice;
use std::collections::HashMap;
use std::sync::OnceLock;

pub mod error;
pub mod pipeline;
pub mod shutdown;
pub mod sink;
pub mod source;
pub mod transform;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

mod fanout;

pub use error::{Error, StageError};
pub use pipeline::{KillHandle, Pipeline, PipelineBuilder, PipelineHandle, from_spec};
pub use sink::{FlushOutcome, Sink, SinkConfig};
pub use source::Source;
pub use transform::Transform;

/// Trait for factory types that expose a name.
pub trait NamedFactory {
    /// Returns the registry key of the factory.
    fn name(&self) -> &'static str;
}

/// A factory for creating sources.
#[derive(Clone, Copy)]
pub struct SourceFactory {
    /// The registry key matched against a node's `type` attribute.
    pub name: &'static str,
    /// Builds a source from the node's attributes.
    pub create: fn(&NodeSpec) -> Result<Box<dyn Source>, loggraph_config::Error>,
}

impl NamedFactory for SourceFactory {
    fn name(&self) -> &'static str {
        self.name
    }
}

/// A factory for creating transforms.
#[derive(Clone, Copy)]
pub struct TransformFactory {
    /// The registry key matched against a node's `type` attribute.
    pub name: &'static str,
    /// Builds a transform from the node's attributes.
    pub create: fn(&NodeSpec) -> Result<Box<dyn Transform>, loggraph_config::Error>,
}

impl NamedFactory for TransformFactory {
    fn name(&self) -> &'static str {
        self.name
    }
}

/// A factory for creating sinks.
#[derive(Clone, Copy)]
pub struct SinkFactory {
    /// The registry key matched against a node's `type` attribute.
    pub name: &'static str,
    /// Builds a sink from the node's attributes.
    pub create: fn(&NodeSpec) -> Result<Box<dyn Sink>, loggraph_config::Error>,
}

impl NamedFactory for SinkFactory {
    fn name(&self) -> &'static str {
        self.name
    }
}

/// Registered source factories. Plugin crates add entries with
/// `#[distributed_slice(SOURCE_FACTORIES)]`.
#[distributed_slice]
pub static SOURCE_FACTORIES: [SourceFactory];

/// Registered transform factories.
#[distributed_slice]
pub static TRANSFORM_FACTORIES: [TransformFactory];

/// Registered sink factories.
#[distributed_slice]
pub static SINK_FACTORIES: [SinkFactory];

fn factory_map<T>(
    map: &'static OnceLock<HashMap<&'static str, T>>,
    slice: &'static [T],
) -> &'static HashMap<&'static str, T>
where
    T: NamedFactory + Clone,
{
    map.get_or_init(|| slice.iter().map(|f| (f.name(), f.clone())).collect())
}

/// Looks up the source factory registered under `name`.
#[must_use]
pub fn source_factory(name: &str) -> Option<&'static SourceFactory> {
    static MAP: OnceLock<HashMap<&'static str, SourceFactory>> = OnceLock::new();
    factory_map(&MAP, &SOURCE_FACTORIES).get(name)
}

/// Looks up the transform factory registered under `name`.
#[must_use]
pub fn transform_factory(name: &str) -> Option<&'static TransformFactory> {
    static MAP: OnceLock<HashMap<&'static str, TransformFactory>> = OnceLock::new();
    factory_map(&MAP, &TRANSFORM_FACTORIES).get(name)
}

/// Looks up the sink factory registered under `name`.
#[must_use]
pub fn sink_factory(name: &str) -> Option<&'static SinkFactory> {
    static MAP: OnceLock<HashMap<&'static str, SinkFactory>> = OnceLock::new();
    factory_map(&MAP, &SINK_FACTORIES).get(name)
}

/// Resolves a registered `type` tag to the kind of stage it constructs.
///
/// This is the resolver handed to config validation: a tag is a source, a
/// transform or a sink depending on which registry it appears in.
#[must_use]
pub fn kind_of_type_tag(tag: &str) -> Option<NodeKind> {
    if source_factory(tag).is_some() {
        Some(NodeKind::Source)
    } else if transform_factory(tag).is_some() {
        Some(NodeKind::Transform)
    } else if sink_factory(tag).is_some() {
        Some(NodeKind::Sink)
    } else {
        None
    }
}
