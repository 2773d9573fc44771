// SPDX-License-Identifier: Apache-2.0

//! Trait and driver for transform stages.
//!
//! A transform applies a drop-predicate to each record of each batch,
//! compacts the batch in place and forwards it. Predicate failures are
//! fail-open: the record is kept unless the predicate explicitly said to
//! drop it.

use crate::error::StageError;
use crate::fanout::{BatchReceiver, BatchSender, fan_out, recv_any};
use loggraph_record::Record;
use loggraph_telemetry::{KIND_TRANSFORM, inc_records_dropped, inc_records_processed};
use tracing::{debug, warn};

/// A capability deciding, record by record, what to drop.
///
/// The predicate is synchronous: it runs once per record on the hot path
/// and has no I/O of its own.
pub trait Transform: Send {
    /// Returns `true` when `record` should be removed from the stream.
    fn should_drop(&mut self, record: &Record) -> Result<bool, StageError>;
}

/// Drives one transform node: filters batches from the in-edges and fans
/// the compacted result out.
pub struct TransformDriver {
    stage: String,
    transform: Box<dyn Transform>,
    inputs: Vec<BatchReceiver>,
    outputs: Vec<BatchSender>,
}

impl TransformDriver {
    pub(crate) fn new(
        stage: String,
        transform: Box<dyn Transform>,
        inputs: Vec<BatchReceiver>,
        outputs: Vec<BatchSender>,
    ) -> Self {
        TransformDriver {
            stage,
            transform,
            inputs,
            outputs,
        }
    }

    /// Runs the driver until every in-edge reaches end-of-stream.
    pub async fn run(mut self) {
        debug!(stage = %self.stage, "transform started");
        let mut inputs = std::mem::take(&mut self.inputs);

        while let Some(mut batch) = recv_any(&mut inputs).await {
            let original = batch.len() as u64;
            let mut dropped: u64 = 0;

            let stage = self.stage.as_str();
            let transform = self.transform.as_mut();
            batch.records_mut().retain(|record| {
                match transform.should_drop(record) {
                    Ok(true) => {
                        dropped += 1;
                        false
                    }
                    Ok(false) => true,
                    Err(error) => {
                        // Fail-open: a broken predicate must not lose data.
                        warn!(stage, %error, "transform predicate failed; keeping record");
                        true
                    }
                }
            });

            inc_records_processed(&self.stage, KIND_TRANSFORM, original);
            inc_records_dropped(&self.stage, dropped);

            // An emptied batch still travels; downstream treats it as a
            // benign tick.
            fan_out(&self.stage, &self.outputs, batch).await;
        }

        debug!(stage = %self.stage, "transform stopped");
    }
}
