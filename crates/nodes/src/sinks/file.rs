// SPDX-License-Identifier: Apache-2.0

//! Sink appending formatted records to a file.

use crate::format::{Formatter, formatter_from_node};
use async_trait::async_trait;
use linkme::distributed_slice;
use loggraph_config::NodeSpec;
use loggraph_engine::{FlushOutcome, SINK_FACTORIES, Sink, SinkFactory};
use loggraph_record::Record;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// A sink appending one formatted line per record to `path`.
///
/// The file opens lazily on the first flush and reopens after an I/O
/// failure, so a rotated or briefly unwritable file heals on retry.
pub struct FileSink {
    path: PathBuf,
    formatter: Box<dyn Formatter>,
    file: Option<File>,
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("path", &self.path)
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

impl FileSink {
    /// Builds the sink from its node attributes: a required `path` and an
    /// optional `format`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the node when `path` is missing
    /// or the format is unknown.
    pub fn from_node(node: &NodeSpec) -> Result<Self, loggraph_config::Error> {
        Ok(FileSink {
            path: PathBuf::from(node.require_attr("path")?),
            formatter: formatter_from_node(node)?,
            file: None,
        })
    }

    async fn open_file(&mut self) -> std::io::Result<&mut File> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            self.file = Some(file);
        }
        Ok(self.file.as_mut().expect("opened above"))
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn flush(&mut self, records: &[Record]) -> FlushOutcome {
        let mut lines = Vec::new();
        for record in records {
            match self.formatter.format(record) {
                Ok(line) => {
                    lines.extend_from_slice(&line);
                    lines.push(b'\n');
                }
                Err(error) => {
                    warn!(%error, "failed to format record");
                }
            }
        }

        let result = async {
            let file = self.open_file().await?;
            file.write_all(&lines).await?;
            file.flush().await
        }
        .await;

        match result {
            Ok(()) => FlushOutcome::Success,
            Err(error) => {
                // Force a reopen on the next attempt.
                self.file = None;
                FlushOutcome::transient(error)
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush().await;
            let _ = file.sync_all().await;
        }
    }
}

#[distributed_slice(SINK_FACTORIES)]
static FILE_SINK: SinkFactory = SinkFactory {
    name: "file",
    create: |node| Ok(Box::new(FileSink::from_node(node)?)),
};
