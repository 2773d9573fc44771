// SPDX-License-Identifier: Apache-2.0

//! Cooperative shutdown of a running pipeline.
//!
//! Closure propagates as a wavefront in topological order: when a node has
//! drained and exited, the coordinator closes the inbound channels of each
//! downstream node whose upstream nodes have *all* closed. Sinks therefore
//! never lose sight of a batch that an upstream accepted before `kill()`:
//! their inbound channels close only after every upstream drained.
//!
//! The adjacency is kept as two plain maps keyed by node name; nodes own
//! nothing of each other.

use crate::fanout::BatchCloser;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Coordinates cancellation and ordered channel closure.
pub struct ShutdownCoordinator {
    inner: Mutex<Inner>,
    cancel: CancellationToken,
}

struct Inner {
    /// Downstream node names per node.
    forward: HashMap<String, Vec<String>>,
    /// Upstream node names per node.
    reverse: HashMap<String, Vec<String>>,
    /// Close handles for every inbound channel of a node.
    in_closers: HashMap<String, Vec<BatchCloser>>,
    /// Nodes that have finished draining.
    closed: HashSet<String>,
}

impl ShutdownCoordinator {
    pub(crate) fn new(
        forward: HashMap<String, Vec<String>>,
        reverse: HashMap<String, Vec<String>>,
        in_closers: HashMap<String, Vec<BatchCloser>>,
    ) -> Self {
        ShutdownCoordinator {
            inner: Mutex::new(Inner {
                forward,
                reverse,
                in_closers,
                closed: HashSet::new(),
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// Requests shutdown: raises the cancel signal on every source driver.
    /// Idempotent; safe to call from signal handlers and tests alike.
    pub fn kill(&self) {
        self.cancel.cancel();
    }

    /// The cancellation token handed to one source driver.
    pub(crate) fn source_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Records that `name` has finished draining and advances the closure
    /// wavefront.
    pub(crate) fn node_finished(&self, name: &str) {
        let mut inner = self.inner.lock();
        if !inner.closed.insert(name.to_owned()) {
            return;
        }
        debug!(stage = name, "node closed");

        let downstreams = inner.forward.get(name).cloned().unwrap_or_default();
        for downstream in downstreams {
            let all_upstreams_closed = inner
                .reverse
                .get(&downstream)
                .is_none_or(|origins| origins.iter().all(|o| inner.closed.contains(o)));
            if all_upstreams_closed {
                if let Some(closers) = inner.in_closers.get(&downstream) {
                    for closer in closers {
                        closer.close();
                    }
                    debug!(stage = %downstream, "inbound channels closed");
                }
            }
        }
    }
}
