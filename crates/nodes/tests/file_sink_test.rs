// SPDX-License-Identifier: Apache-2.0

//! File sink exercised through a full pipeline.

use loggraph_config::PipelineSpec;
use loggraph_engine::testing::{ScriptedSource, make_records};
use loggraph_engine::{PipelineBuilder, SinkConfig};
use loggraph_nodes::sinks::file::FileSink;
use std::time::Duration;

#[tokio::test]
async fn records_land_in_the_file_as_json_lines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("out.log");

    let text = format!(
        r#"digraph {{ out [type="file", path="{}", format="json"]; }}"#,
        path.display()
    );
    let spec = PipelineSpec::parse(&text).expect("parse");
    let sink = FileSink::from_node(&spec.nodes["out"]).expect("build sink");

    let mut builder = PipelineBuilder::new();
    builder
        .add_source(
            "file_src",
            Box::new(ScriptedSource::finite(vec![make_records(&["f1", "f2"])])),
        )
        .expect("add source");
    builder
        .add_sink(
            "file_snk",
            Box::new(sink),
            SinkConfig {
                flush_interval: Duration::from_millis(10),
                ..SinkConfig::default()
            },
        )
        .expect("add sink");
    builder.connect("file_src", "file_snk");

    let handle = builder.build().expect("build").start();
    handle.wait().await.expect("wait");

    let contents = std::fs::read_to_string(&path).expect("read output file");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    for (line, expected) in lines.iter().zip(["f1", "f2"]) {
        let parsed: serde_json::Value = serde_json::from_str(line).expect("json line");
        assert_eq!(parsed["message"], expected);
        assert!(parsed["timestamp"].is_i64());
    }
}

#[tokio::test]
async fn console_format_writes_plain_lines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("plain.log");

    let text = format!(
        r#"digraph {{ out [type="file", path="{}", format="console"]; }}"#,
        path.display()
    );
    let spec = PipelineSpec::parse(&text).expect("parse");
    let sink = FileSink::from_node(&spec.nodes["out"]).expect("build sink");

    let mut builder = PipelineBuilder::new();
    builder
        .add_source(
            "plain_src",
            Box::new(ScriptedSource::finite(vec![make_records(&["only line"])])),
        )
        .expect("add source");
    builder
        .add_sink("plain_snk", Box::new(sink), SinkConfig::default())
        .expect("add sink");
    builder.connect("plain_src", "plain_snk");

    let handle = builder.build().expect("build").start();
    handle.wait().await.expect("wait");

    let contents = std::fs::read_to_string(&path).expect("read output file");
    assert_eq!(contents, "only line\n");
}
