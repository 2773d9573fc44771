// SPDX-License-Identifier: Apache-2.0

//! Sink discarding everything, for benchmarks and plumbing tests.

use async_trait::async_trait;
use linkme::distributed_slice;
use loggraph_engine::{FlushOutcome, SINK_FACTORIES, Sink, SinkFactory};
use loggraph_record::Record;

/// Accepts every batch and drops it on the floor.
pub struct DevNullSink;

#[async_trait]
impl Sink for DevNullSink {
    async fn flush(&mut self, _records: &[Record]) -> FlushOutcome {
        FlushOutcome::Success
    }

    async fn close(&mut self) {}
}

#[distributed_slice(SINK_FACTORIES)]
static DEVNULL_SINK: SinkFactory = SinkFactory {
    name: "devnull",
    create: |_node| Ok(Box::new(DevNullSink)),
};
