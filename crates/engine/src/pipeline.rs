// SPDX-License-Identifier: Apache-2.0

//! Graph materialization and the running pipeline.
//!
//! [`PipelineBuilder`] is the programmatic surface: stages are added with
//! their capabilities, edges declare dataflow, and `build` validates the
//! graph and allocates one bounded channel per edge. [`from_spec`] layers
//! the configuration path on top, resolving each node's `type` attribute
//! against the factory registries.

use crate::error::Error;
use crate::fanout::{BatchCloser, BatchReceiver, BatchSender};
use crate::shutdown::ShutdownCoordinator;
use crate::sink::{Sink, SinkConfig, SinkDriver};
use crate::source::{Source, SourceDriver};
use crate::transform::{Transform, TransformDriver};
use crate::{kind_of_type_tag, sink_factory, source_factory, transform_factory};
use loggraph_channel::spsc;
use loggraph_config::{EdgeSpec, LinkType, NodeKind, NodeSpec, PipelineSpec};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Materializes a validated configuration into a [`Pipeline`].
///
/// # Errors
///
/// Returns a configuration error naming the offending node when validation
/// or any stage constructor fails.
pub fn from_spec(spec: &PipelineSpec) -> Result<Pipeline, Error> {
    let kinds = spec.validate(|node| kind_of_type_tag(&node.type_tag))?;

    let mut builder = PipelineBuilder::new();
    for (name, node) in &spec.nodes {
        match kinds[name] {
            NodeKind::Source => {
                let factory =
                    source_factory(&node.type_tag).expect("tag resolved during validation");
                builder.add_source(name.as_str(), (factory.create)(node)?)?;
            }
            NodeKind::Transform => {
                let factory =
                    transform_factory(&node.type_tag).expect("tag resolved during validation");
                builder.add_transform(name.as_str(), (factory.create)(node)?)?;
            }
            NodeKind::Sink => {
                let factory =
                    sink_factory(&node.type_tag).expect("tag resolved during validation");
                let config = SinkConfig::from_node(node)?;
                builder.add_sink(name.as_str(), (factory.create)(node)?, config)?;
            }
        }
    }
    for edge in &spec.edges {
        builder.add_edge(edge.clone());
    }
    builder.build()
}

enum StageEntry {
    Source(Box<dyn Source>),
    Transform(Box<dyn Transform>),
    Sink(Box<dyn Sink>, SinkConfig),
}

impl StageEntry {
    fn kind(&self) -> NodeKind {
        match self {
            StageEntry::Source(_) => NodeKind::Source,
            StageEntry::Transform(_) => NodeKind::Transform,
            StageEntry::Sink(..) => NodeKind::Sink,
        }
    }
}

/// Assembles stages and edges into a runnable pipeline.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: BTreeMap<String, StageEntry>,
    edges: Vec<EdgeSpec>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        PipelineBuilder::default()
    }

    /// Declares a source stage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StageAlreadyExists`] on a duplicate name.
    pub fn add_source(
        &mut self,
        name: impl Into<String>,
        source: Box<dyn Source>,
    ) -> Result<(), Error> {
        self.add_stage(name.into(), StageEntry::Source(source))
    }

    /// Declares a transform stage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StageAlreadyExists`] on a duplicate name.
    pub fn add_transform(
        &mut self,
        name: impl Into<String>,
        transform: Box<dyn Transform>,
    ) -> Result<(), Error> {
        self.add_stage(name.into(), StageEntry::Transform(transform))
    }

    /// Declares a sink stage with its batching configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StageAlreadyExists`] on a duplicate name.
    pub fn add_sink(
        &mut self,
        name: impl Into<String>,
        sink: Box<dyn Sink>,
        config: SinkConfig,
    ) -> Result<(), Error> {
        self.add_stage(name.into(), StageEntry::Sink(sink, config))
    }

    fn add_stage(&mut self, name: String, entry: StageEntry) -> Result<(), Error> {
        if self.stages.contains_key(&name) {
            return Err(Error::StageAlreadyExists { stage: name });
        }
        let _ = self.stages.insert(name, entry);
        Ok(())
    }

    /// Declares a normal edge with the default channel capacity.
    pub fn connect(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.add_edge(EdgeSpec {
            from: from.into(),
            to: to.into(),
            link_type: LinkType::Normal,
            capacity: None,
        });
    }

    /// Declares a normal edge with an explicit channel capacity.
    pub fn connect_with_capacity(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        capacity: usize,
    ) {
        self.add_edge(EdgeSpec {
            from: from.into(),
            to: to.into(),
            link_type: LinkType::Normal,
            capacity: Some(capacity),
        });
    }

    /// Declares the overflow edge of a sink.
    pub fn connect_overflow(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.add_edge(EdgeSpec {
            from: from.into(),
            to: to.into(),
            link_type: LinkType::Overflow,
            capacity: None,
        });
    }

    /// Declares an edge from its parsed form.
    pub fn add_edge(&mut self, edge: EdgeSpec) {
        self.edges.push(edge);
    }

    /// Validates the graph, allocates one channel per edge and wires every
    /// driver.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the graph violates a structural
    /// rule (kind compatibility, cycles, overflow constraints).
    pub fn build(self) -> Result<Pipeline, Error> {
        self.check_shape()?;

        let mut out_senders: HashMap<String, Vec<BatchSender>> = HashMap::new();
        let mut overflow_senders: HashMap<String, BatchSender> = HashMap::new();
        let mut in_receivers: HashMap<String, Vec<BatchReceiver>> = HashMap::new();
        let mut in_closers: HashMap<String, Vec<BatchCloser>> = HashMap::new();
        let mut forward: HashMap<String, Vec<String>> = HashMap::new();
        let mut reverse: HashMap<String, Vec<String>> = HashMap::new();

        for edge in &self.edges {
            let (tx, rx) = spsc::bounded(edge.channel_capacity());
            in_closers.entry(edge.to.clone()).or_default().push(tx.closer());
            in_receivers.entry(edge.to.clone()).or_default().push(rx);
            match edge.link_type {
                LinkType::Normal => {
                    out_senders.entry(edge.from.clone()).or_default().push(tx);
                }
                LinkType::Overflow => {
                    let _ = overflow_senders.insert(edge.from.clone(), tx);
                }
            }

            let downstreams = forward.entry(edge.from.clone()).or_default();
            if !downstreams.contains(&edge.to) {
                downstreams.push(edge.to.clone());
            }
            let upstreams = reverse.entry(edge.to.clone()).or_default();
            if !upstreams.contains(&edge.from) {
                upstreams.push(edge.from.clone());
            }
        }

        let coordinator = Arc::new(ShutdownCoordinator::new(forward, reverse, in_closers));

        let mut drivers = Vec::with_capacity(self.stages.len());
        for (name, entry) in self.stages {
            let driver = match entry {
                StageEntry::Source(source) => Driver::Source(SourceDriver::new(
                    name.clone(),
                    source,
                    out_senders.remove(&name).unwrap_or_default(),
                    coordinator.source_token(),
                )),
                StageEntry::Transform(transform) => Driver::Transform(TransformDriver::new(
                    name.clone(),
                    transform,
                    in_receivers.remove(&name).unwrap_or_default(),
                    out_senders.remove(&name).unwrap_or_default(),
                )),
                StageEntry::Sink(sink, config) => Driver::Sink(SinkDriver::new(
                    name.clone(),
                    sink,
                    in_receivers.remove(&name).unwrap_or_default(),
                    overflow_senders.remove(&name),
                    config,
                )),
            };
            drivers.push((name, driver));
        }

        Ok(Pipeline {
            drivers,
            coordinator,
        })
    }

    /// Re-checks the structural rules on the assembled graph by delegating
    /// to config validation with the kinds already known.
    fn check_shape(&self) -> Result<(), Error> {
        let kinds: BTreeMap<String, NodeKind> = self
            .stages
            .iter()
            .map(|(name, entry)| (name.clone(), entry.kind()))
            .collect();
        let synthetic = PipelineSpec {
            nodes: self
                .stages
                .keys()
                .map(|name| {
                    (
                        name.clone(),
                        NodeSpec {
                            name: name.clone(),
                            type_tag: String::new(),
                            attrs: HashMap::new(),
                        },
                    )
                })
                .collect(),
            edges: self.edges.clone(),
            attrs: HashMap::new(),
        };
        let _ = synthetic.validate(|node| kinds.get(&node.name).copied())?;
        Ok(())
    }
}

enum Driver {
    Source(SourceDriver),
    Transform(TransformDriver),
    Sink(SinkDriver),
}

impl Driver {
    async fn run(self) {
        match self {
            Driver::Source(driver) => driver.run().await,
            Driver::Transform(driver) => driver.run().await,
            Driver::Sink(driver) => driver.run().await,
        }
    }
}

/// A wired pipeline, ready to start.
pub struct Pipeline {
    drivers: Vec<(String, Driver)>,
    coordinator: Arc<ShutdownCoordinator>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.drivers.iter().map(|(name, _)| name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Spawns one task per driver and returns the running handle.
    #[must_use]
    pub fn start(self) -> PipelineHandle {
        info!(stages = self.drivers.len(), "pipeline starting");
        let coordinator = self.coordinator;
        let mut tasks = Vec::with_capacity(self.drivers.len());

        for (name, driver) in self.drivers {
            let coordinator = coordinator.clone();
            let stage = name.clone();
            let task = tokio::spawn(async move {
                driver.run().await;
                coordinator.node_finished(&stage);
            });
            tasks.push((name, task));
        }

        PipelineHandle { coordinator, tasks }
    }
}

/// Handle over a running pipeline: external shutdown and completion.
pub struct PipelineHandle {
    coordinator: Arc<ShutdownCoordinator>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

/// A cloneable handle that can request shutdown, e.g. from a signal task.
#[derive(Clone)]
pub struct KillHandle {
    coordinator: Arc<ShutdownCoordinator>,
}

impl KillHandle {
    /// Requests graceful shutdown. Idempotent.
    pub fn kill(&self) {
        self.coordinator.kill();
    }
}

impl PipelineHandle {
    /// Requests graceful shutdown. Idempotent.
    ///
    /// Sources stop accepting data; everything already accepted flows
    /// through to a sink or its overflow before [`PipelineHandle::wait`]
    /// returns.
    pub fn kill(&self) {
        self.coordinator.kill();
    }

    /// A detached handle for requesting shutdown while `wait` consumes this
    /// one.
    #[must_use]
    pub fn kill_handle(&self) -> KillHandle {
        KillHandle {
            coordinator: self.coordinator.clone(),
        }
    }

    /// Waits until every driver has exited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JoinTask`] for the first driver task that failed to
    /// join; the remaining drivers are still awaited.
    pub async fn wait(self) -> Result<(), Error> {
        let mut first_error = None;
        for (stage, task) in self.tasks {
            if let Err(join_error) = task.await {
                let error = Error::JoinTask {
                    stage,
                    is_panic: join_error.is_panic(),
                    error: join_error.to_string(),
                };
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
        info!("pipeline stopped");
        match first_error {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }
}
