// SPDX-License-Identifier: Apache-2.0

//! Socket listener source.
//!
//! Listens on a TCP address (`listen="127.0.0.1:9000"`) or a Unix domain
//! socket (`listen="unix:/run/loggraph/loggraph.sock"`). Every accepted
//! connection is read line by line on its own task; parsed records funnel
//! into one internal queue that `next_batch` drains.
//!
//! Cancellation closes the listener and the per-connection readers, so a
//! blocked `next_batch` wakes within bounded time.

use crate::parse::{Parser, parser_from_node};
use async_trait::async_trait;
use linkme::distributed_slice;
use loggraph_config::NodeSpec;
use loggraph_engine::{SOURCE_FACTORIES, Source, SourceFactory, StageError};
use loggraph_record::{Batch, BatchPool, Record};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Records buffered between the connection readers and `next_batch`.
const QUEUE_DEPTH: usize = 1024;

/// Largest batch `next_batch` assembles from queued records.
const MAX_READ_BATCH: usize = 100;

#[derive(Debug, Clone)]
enum ListenAddr {
    Tcp(SocketAddr),
    #[cfg(unix)]
    Unix(std::path::PathBuf),
}

/// A source reading line-framed records from socket connections.
pub struct SocketSource {
    listen: ListenAddr,
    parser: Arc<dyn Parser>,
    queue: Option<mpsc::Receiver<Record>>,
    accept_task: Option<JoinHandle<()>>,
    stop: CancellationToken,
}

impl std::fmt::Debug for SocketSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketSource")
            .field("listen", &self.listen)
            .field("queue", &self.queue)
            .field("accept_task", &self.accept_task)
            .field("stop", &self.stop)
            .finish_non_exhaustive()
    }
}

impl SocketSource {
    /// Builds the source from its node attributes: a required `listen`
    /// address and an optional `parser`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the node when the address or
    /// parser attribute is invalid.
    pub fn from_node(node: &NodeSpec) -> Result<Self, loggraph_config::Error> {
        Ok(SocketSource {
            listen: parse_listen(node)?,
            parser: parser_from_node(node)?,
            queue: None,
            accept_task: None,
            stop: CancellationToken::new(),
        })
    }
}

fn parse_listen(node: &NodeSpec) -> Result<ListenAddr, loggraph_config::Error> {
    let raw = node.require_attr("listen")?;
    if let Some(path) = raw.strip_prefix("unix:") {
        return unix_listen(node, path);
    }
    let addr = raw
        .parse::<SocketAddr>()
        .map_err(|e| loggraph_config::Error::InvalidAttribute {
            node: node.name.clone(),
            attribute: "listen".to_owned(),
            reason: e.to_string(),
        })?;
    Ok(ListenAddr::Tcp(addr))
}

#[cfg(unix)]
fn unix_listen(_node: &NodeSpec, path: &str) -> Result<ListenAddr, loggraph_config::Error> {
    Ok(ListenAddr::Unix(std::path::PathBuf::from(path)))
}

#[cfg(not(unix))]
fn unix_listen(node: &NodeSpec, _path: &str) -> Result<ListenAddr, loggraph_config::Error> {
    Err(loggraph_config::Error::InvalidAttribute {
        node: node.name.clone(),
        attribute: "listen".to_owned(),
        reason: "unix sockets are not supported on this platform".to_owned(),
    })
}

#[async_trait]
impl Source for SocketSource {
    async fn initialize(&mut self) -> Result<(), StageError> {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        self.queue = Some(rx);

        let parser = self.parser.clone();
        let stop = self.stop.clone();
        let task = match &self.listen {
            ListenAddr::Tcp(addr) => {
                let listener = TcpListener::bind(addr).await?;
                debug!(address = %addr, "socket source listening");
                tokio::spawn(accept_tcp(listener, parser, tx, stop))
            }
            #[cfg(unix)]
            ListenAddr::Unix(path) => {
                if path.exists() {
                    debug!(path = %path.display(), "cleaning up left-behind socket");
                    std::fs::remove_file(path)?;
                }
                let listener = tokio::net::UnixListener::bind(path)?;
                debug!(path = %path.display(), "socket source listening");
                tokio::spawn(accept_unix(listener, parser, tx, stop))
            }
        };
        self.accept_task = Some(task);
        Ok(())
    }

    async fn next_batch(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Batch>, StageError> {
        let Some(queue) = self.queue.as_mut() else {
            return Ok(None);
        };

        let first = tokio::select! {
            record = queue.recv() => record,
            () = cancel.cancelled() => return Ok(None),
        };
        let Some(first) = first else {
            return Ok(None);
        };

        let mut batch = BatchPool::global().acquire(MAX_READ_BATCH);
        batch.push(first);
        while batch.len() < MAX_READ_BATCH {
            match queue.try_recv() {
                Ok(record) => batch.push(record),
                Err(_) => break,
            }
        }
        Ok(Some(batch))
    }

    async fn shutdown(&mut self) {
        self.stop.cancel();
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        #[cfg(unix)]
        if let ListenAddr::Unix(path) = &self.listen {
            let _ = std::fs::remove_file(path);
        }
    }
}

async fn accept_tcp(
    listener: TcpListener,
    parser: Arc<dyn Parser>,
    tx: mpsc::Sender<Record>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((conn, peer)) => {
                    debug!(%peer, "socket connection accepted");
                    let _ = tokio::spawn(read_lines(conn, parser.clone(), tx.clone(), stop.clone()));
                }
                Err(error) => {
                    warn!(%error, "socket accept failed");
                }
            },
        }
    }
}

#[cfg(unix)]
async fn accept_unix(
    listener: tokio::net::UnixListener,
    parser: Arc<dyn Parser>,
    tx: mpsc::Sender<Record>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((conn, _)) => {
                    debug!("socket connection accepted");
                    let _ = tokio::spawn(read_lines(conn, parser.clone(), tx.clone(), stop.clone()));
                }
                Err(error) => {
                    warn!(%error, "socket accept failed");
                }
            },
        }
    }
}

async fn read_lines<S>(
    stream: S,
    parser: Arc<dyn Parser>,
    tx: mpsc::Sender<Record>,
    stop: CancellationToken,
) where
    S: AsyncRead + Unpin + Send,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = tokio::select! {
            () = stop.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => match parser.parse(line.as_bytes()) {
                Ok(record) => {
                    if tx.send(record).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(%error, "failed to parse received line");
                }
            },
            Ok(None) => break,
            Err(error) => {
                warn!(%error, "socket read failed");
                break;
            }
        }
    }
}

#[distributed_slice(SOURCE_FACTORIES)]
static SOCKET_SOURCE: SourceFactory = SourceFactory {
    name: "socket",
    create: |node| Ok(Box::new(SocketSource::from_node(node)?)),
};

#[cfg(test)]
mod tests {
    #![allow(missing_docs)]
    use super::*;
    use loggraph_config::PipelineSpec;

    fn node(attrs: &str) -> NodeSpec {
        let text = format!(r#"digraph {{ in [type="socket", {attrs}]; }}"#);
        PipelineSpec::parse(&text).expect("parse").nodes["in"].clone()
    }

    #[test]
    fn tcp_listen_address_parses() {
        assert!(SocketSource::from_node(&node(r#"listen="127.0.0.1:9999""#)).is_ok());
    }

    #[test]
    fn bad_listen_address_is_rejected() {
        let err = SocketSource::from_node(&node(r#"listen="not-an-address""#))
            .expect_err("invalid address");
        assert!(matches!(
            err,
            loggraph_config::Error::InvalidAttribute { attribute, .. } if attribute == "listen"
        ));
    }

    #[test]
    fn unknown_parser_is_rejected() {
        let err = SocketSource::from_node(&node(r#"listen="127.0.0.1:9999", parser="xml""#))
            .expect_err("invalid parser");
        assert!(matches!(
            err,
            loggraph_config::Error::InvalidAttribute { attribute, .. } if attribute == "parser"
        ));
    }
}
