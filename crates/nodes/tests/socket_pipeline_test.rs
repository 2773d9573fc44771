// SPDX-License-Identifier: Apache-2.0

//! Socket source exercised through a full pipeline over real connections.

use loggraph_config::PipelineSpec;
use loggraph_engine::testing::{ScriptedSink, SinkRecorder};
use loggraph_engine::{PipelineBuilder, PipelineHandle, SinkConfig};
use loggraph_nodes::sources::socket::SocketSource;
use loggraph_record::Value;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

fn socket_node(attrs: &str) -> loggraph_config::NodeSpec {
    let text = format!(r#"digraph {{ in [type="socket", {attrs}]; }}"#);
    PipelineSpec::parse(&text).expect("parse").nodes["in"].clone()
}

fn start_socket_pipeline(attrs: &str, recorder: &SinkRecorder) -> PipelineHandle {
    let source = SocketSource::from_node(&socket_node(attrs)).expect("build source");
    let mut builder = PipelineBuilder::new();
    builder.add_source("sock_src", Box::new(source)).expect("add source");
    builder
        .add_sink(
            "sock_snk",
            Box::new(ScriptedSink::always_success(recorder.clone())),
            SinkConfig {
                flush_interval: Duration::from_millis(5),
                ..SinkConfig::default()
            },
        )
        .expect("add sink");
    builder.connect("sock_src", "sock_snk");
    builder.build().expect("build").start()
}

async fn connect_with_retry(addr: &str) -> TcpStream {
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect(addr).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("listener at {addr} never came up");
}

async fn wait_for_records(recorder: &SinkRecorder, count: usize) {
    for _ in 0..500 {
        if recorder.records().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "timed out waiting for {count} records, saw {}",
        recorder.records().len()
    );
}

#[tokio::test]
async fn tcp_lines_flow_to_the_sink() {
    let port = portpicker::pick_unused_port().expect("free port");
    let addr = format!("127.0.0.1:{port}");
    let recorder = SinkRecorder::new();
    let handle = start_socket_pipeline(&format!(r#"listen="{addr}""#), &recorder);

    let mut conn = connect_with_retry(&addr).await;
    conn.write_all(b"hello\nworld\n").await.expect("write");
    conn.shutdown().await.expect("shutdown");

    wait_for_records(&recorder, 2).await;
    handle.kill();
    handle.wait().await.expect("wait");

    assert_eq!(recorder.messages(), vec!["hello", "world"]);
}

#[tokio::test]
async fn json_parser_extracts_fields() {
    let port = portpicker::pick_unused_port().expect("free port");
    let addr = format!("127.0.0.1:{port}");
    let recorder = SinkRecorder::new();
    let handle =
        start_socket_pipeline(&format!(r#"listen="{addr}", parser="json""#), &recorder);

    let mut conn = connect_with_retry(&addr).await;
    conn.write_all(b"{\"message\":\"from json\",\"level\":\"warn\"}\nnot-json\n")
        .await
        .expect("write");
    conn.shutdown().await.expect("shutdown");

    // The malformed line is skipped; only the object becomes a record.
    wait_for_records(&recorder, 1).await;
    handle.kill();
    handle.wait().await.expect("wait");

    let records = recorder.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message(), Some(&Value::String("from json".into())));
    assert_eq!(records[0].fields.get("level"), Some(&Value::from("warn")));
}

#[cfg(unix)]
#[tokio::test]
async fn unix_socket_lines_flow_to_the_sink() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("loggraph-test.sock");
    let recorder = SinkRecorder::new();
    let handle = start_socket_pipeline(
        &format!(r#"listen="unix:{}""#, path.display()),
        &recorder,
    );

    let mut conn = None;
    for _ in 0..100 {
        match tokio::net::UnixStream::connect(&path).await {
            Ok(stream) => {
                conn = Some(stream);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    let mut conn = conn.expect("unix listener never came up");
    conn.write_all(b"over unix\n").await.expect("write");
    conn.shutdown().await.expect("shutdown");

    wait_for_records(&recorder, 1).await;
    handle.kill();
    handle.wait().await.expect("wait");

    assert_eq!(recorder.messages(), vec!["over unix"]);
}
