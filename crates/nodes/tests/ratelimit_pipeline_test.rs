// SPDX-License-Identifier: Apache-2.0

//! Rate limiting exercised through a full pipeline.

use loggraph_config::PipelineSpec;
use loggraph_engine::testing::{ScriptedSink, ScriptedSource, SinkRecorder, make_record_with_field};
use loggraph_engine::{PipelineBuilder, SinkConfig};
use loggraph_nodes::transforms::ratelimit::RateLimitTransform;
use loggraph_record::Value;
use loggraph_telemetry::records_dropped;
use std::time::Duration;

#[tokio::test]
async fn token_bucket_drops_burst_within_partition() {
    let recorder = SinkRecorder::new();
    // Three records inside one batch, so they hit the bucket back to back.
    let burst = vec![
        make_record_with_field("first-x", "k", "x"),
        make_record_with_field("second-x", "k", "x"),
        make_record_with_field("first-y", "k", "y"),
    ];

    let spec = PipelineSpec::parse(
        r#"digraph { rl [type="ratelimit", partition_key="k", rate="1"]; }"#,
    )
    .expect("parse");
    let ratelimit = RateLimitTransform::from_node(&spec.nodes["rl"]).expect("build transform");

    let mut builder = PipelineBuilder::new();
    builder
        .add_source("rl_src", Box::new(ScriptedSource::finite(vec![burst])))
        .expect("add source");
    builder
        .add_transform("rl", Box::new(ratelimit))
        .expect("add transform");
    builder
        .add_sink(
            "rl_snk",
            Box::new(ScriptedSink::always_success(recorder.clone())),
            SinkConfig {
                flush_interval: Duration::from_millis(10),
                ..SinkConfig::default()
            },
        )
        .expect("add sink");
    builder.connect("rl_src", "rl");
    builder.connect("rl", "rl_snk");

    let handle = builder.build().expect("build").start();
    handle.wait().await.expect("wait");

    let delivered = recorder.records();
    assert_eq!(delivered.len(), 2, "one record per partition survives");
    assert_eq!(delivered[0].fields.get("k"), Some(&Value::from("x")));
    assert_eq!(delivered[1].fields.get("k"), Some(&Value::from("y")));
    assert_eq!(records_dropped("rl"), 1);
}
