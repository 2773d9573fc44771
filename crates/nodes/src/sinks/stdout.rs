// SPDX-License-Identifier: Apache-2.0

//! Sink writing formatted records to standard output.

use crate::format::{Formatter, formatter_from_node};
use async_trait::async_trait;
use linkme::distributed_slice;
use loggraph_config::NodeSpec;
use loggraph_engine::{FlushOutcome, SINK_FACTORIES, Sink, SinkFactory};
use loggraph_record::Record;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// A sink printing one formatted line per record.
pub struct StdoutSink {
    formatter: Box<dyn Formatter>,
    stdout: tokio::io::Stdout,
}

impl StdoutSink {
    /// Builds the sink from its node attributes (`format`, defaulting to
    /// `json`).
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the node for an unknown format.
    pub fn from_node(node: &NodeSpec) -> Result<Self, loggraph_config::Error> {
        Ok(StdoutSink {
            formatter: formatter_from_node(node)?,
            stdout: tokio::io::stdout(),
        })
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn flush(&mut self, records: &[Record]) -> FlushOutcome {
        for record in records {
            // A record the formatter rejects is bad data, not an output
            // failure; retrying would not help.
            let line = match self.formatter.format(record) {
                Ok(line) => line,
                Err(error) => {
                    warn!(%error, "failed to format record");
                    continue;
                }
            };
            if let Err(error) = self.stdout.write_all(&line).await {
                return FlushOutcome::transient(error);
            }
            if let Err(error) = self.stdout.write_all(b"\n").await {
                return FlushOutcome::transient(error);
            }
        }
        match self.stdout.flush().await {
            Ok(()) => FlushOutcome::Success,
            Err(error) => FlushOutcome::transient(error),
        }
    }

    async fn close(&mut self) {
        let _ = self.stdout.flush().await;
    }
}

#[distributed_slice(SINK_FACTORIES)]
static STDOUT_SINK: SinkFactory = SinkFactory {
    name: "stdout",
    create: |node| Ok(Box::new(StdoutSink::from_node(node)?)),
};
