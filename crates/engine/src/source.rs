// SPDX-License-Identifier: Apache-2.0

//! Trait and driver for source stages.
//!
//! A source is an ingress node that feeds the pipeline with batches from an
//! external system (a socket, a journal, a queue) while normalizing
//! vendor-specific payload keys onto the record model.
//!
//! # Lifecycle
//!
//! 1. The driver calls [`Source::initialize`]; a failure there is recorded
//!    and ends the driver.
//! 2. [`Source::next_batch`] is polled in a loop. Transient errors are
//!    logged and polling continues; `Ok(None)` reports that the pending wait
//!    was cancelled and ends the loop.
//! 3. [`Source::shutdown`] runs once the loop exits, before the shutdown
//!    coordinator is told the node has closed.
//!
//! # Cancellation
//!
//! The coordinator raises the driver's [`CancellationToken`] on `kill()`.
//! A source whose `next_batch` blocks must honor the token within bounded
//! time, typically by selecting over its I/O wait and `cancel.cancelled()`.

use crate::error::StageError;
use crate::fanout::{BatchSender, fan_out};
use async_trait::async_trait;
use loggraph_record::Batch;
use loggraph_telemetry::{KIND_SOURCE, inc_records_processed};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// A capability producing batches from an external system.
#[async_trait]
pub trait Source: Send {
    /// Prepares the source for reading (binds listeners, opens cursors).
    async fn initialize(&mut self) -> Result<(), StageError>;

    /// Reads the next batch, waiting until data arrives or `cancel` fires.
    ///
    /// Returns `Ok(None)` when the wait was cancelled and the source has no
    /// more data to hand over.
    async fn next_batch(&mut self, cancel: &CancellationToken)
    -> Result<Option<Batch>, StageError>;

    /// Releases the source's resources. Called exactly once, after the last
    /// `next_batch`.
    async fn shutdown(&mut self);
}

/// Drives one source node: pumps batches into the node's out-edges.
pub struct SourceDriver {
    stage: String,
    source: Box<dyn Source>,
    outputs: Vec<BatchSender>,
    cancel: CancellationToken,
}

impl SourceDriver {
    pub(crate) fn new(
        stage: String,
        source: Box<dyn Source>,
        outputs: Vec<BatchSender>,
        cancel: CancellationToken,
    ) -> Self {
        SourceDriver {
            stage,
            source,
            outputs,
            cancel,
        }
    }

    /// Runs the driver to completion.
    pub async fn run(mut self) {
        if let Err(error) = self.source.initialize().await {
            error!(stage = %self.stage, %error, "source initialization failed");
            return;
        }
        debug!(stage = %self.stage, "source started");

        loop {
            match self.source.next_batch(&self.cancel).await {
                Ok(Some(batch)) => {
                    inc_records_processed(&self.stage, KIND_SOURCE, batch.len() as u64);
                    fan_out(&self.stage, &self.outputs, batch).await;
                }
                Ok(None) => break,
                Err(error) => {
                    warn!(stage = %self.stage, %error, "source read failed");
                }
            }
        }

        self.source.shutdown().await;
        debug!(stage = %self.stage, "source stopped");
    }
}
