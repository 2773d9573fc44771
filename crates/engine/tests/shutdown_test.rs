// SPDX-License-Identifier: Apache-2.0

//! Shutdown drain guarantees.
//!
//! Kept in its own test binary: the batch pool is process-wide, so the
//! outstanding-batch assertion needs a process without concurrent pipelines.

use loggraph_engine::testing::{ScriptedSink, ScriptedSource, SinkRecorder, make_records};
use loggraph_engine::{PipelineBuilder, SinkConfig};
use loggraph_record::BatchPool;
use loggraph_telemetry::{KIND_SINK_SUCCESS, records_processed};
use std::time::Duration;

#[tokio::test]
async fn kill_drains_every_accepted_record() {
    let recorder = SinkRecorder::new();
    // 100 records in quick batches of 10; the source then blocks as a live
    // source would, so only kill() can end it.
    let batches = (0..10)
        .map(|batch| {
            let messages: Vec<String> =
                (0..10).map(|i| format!("s{}", batch * 10 + i)).collect();
            let refs: Vec<&str> = messages.iter().map(String::as_str).collect();
            make_records(&refs)
        })
        .collect();

    let mut builder = PipelineBuilder::new();
    builder
        .add_source("drain_src", Box::new(ScriptedSource::then_blocking(batches)))
        .expect("add source");
    builder
        .add_sink(
            "drain_snk",
            Box::new(ScriptedSink::always_success(recorder.clone())),
            SinkConfig {
                flush_interval: Duration::from_millis(10),
                ..SinkConfig::default()
            },
        )
        .expect("add sink");
    builder.connect("drain_src", "drain_snk");

    let handle = builder.build().expect("build").start();
    // Kill while batches are still queued in the channel.
    handle.kill();
    handle.kill(); // idempotent
    handle.wait().await.expect("wait");

    let messages = recorder.messages();
    assert_eq!(messages.len(), 100, "no loss, no duplication");
    let expected: Vec<String> = (0..100).map(|i| format!("s{i}")).collect();
    assert_eq!(messages, expected, "source emission order preserved");
    assert_eq!(records_processed("drain_snk", KIND_SINK_SUCCESS), 100);

    assert_eq!(
        BatchPool::global().outstanding(),
        0,
        "every batch returned to the pool after wait()"
    );
}
