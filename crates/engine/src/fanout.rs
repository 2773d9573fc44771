// SPDX-License-Identifier: Apache-2.0

//! Batch movement helpers shared by the stage drivers.

use loggraph_channel::spsc;
use loggraph_record::{Batch, BatchPool};
use tracing::error;

pub(crate) type BatchSender = spsc::Sender<Batch>;
pub(crate) type BatchReceiver = spsc::Receiver<Batch>;
pub(crate) type BatchCloser = spsc::Closer<Batch>;

/// Sends `batch` over one edge, blocking while the channel is full.
///
/// A closed channel is only possible when a consumer vanished outside the
/// shutdown protocol; the batch is returned to the pool so accounting stays
/// balanced.
pub(crate) async fn send_batch(stage: &str, tx: &BatchSender, batch: Batch) {
    if let Err(err) = tx.send(batch).await {
        debug_assert!(
            false,
            "stage `{stage}` sent on a closed channel outside shutdown"
        );
        error!(stage, "dropping batch: downstream channel closed");
        BatchPool::global().release(err.into_inner());
    }
}

/// Delivers `batch` to every out-edge.
///
/// The first edge receives the original; every additional edge receives a
/// deep copy so destinations may mutate independently.
pub(crate) async fn fan_out(stage: &str, outputs: &[BatchSender], batch: Batch) {
    let pool = BatchPool::global();
    let Some(first) = outputs.first() else {
        pool.release(batch);
        return;
    };

    let clones: Vec<Batch> = outputs
        .iter()
        .skip(1)
        .map(|_| pool.clone_batch(&batch))
        .collect();
    send_batch(stage, first, batch).await;
    for (tx, clone) in outputs.iter().skip(1).zip(clones) {
        send_batch(stage, tx, clone).await;
    }
}

/// Receives the next batch from any live in-edge.
///
/// Returns `None` once every in-edge has reached end-of-stream. Served
/// edges rotate to the back so a busy edge cannot starve its siblings
/// indefinitely.
pub(crate) async fn recv_any(inputs: &mut Vec<BatchReceiver>) -> Option<Batch> {
    while !inputs.is_empty() {
        let (result, index) = {
            let recvs: Vec<_> = inputs.iter().map(|rx| Box::pin(rx.recv())).collect();
            let (result, index, rest) = futures::future::select_all(recvs).await;
            drop(rest);
            (result, index)
        };
        match result {
            Ok(batch) => {
                let served = inputs.remove(index);
                inputs.push(served);
                return Some(batch);
            }
            Err(_) => {
                drop(inputs.remove(index));
            }
        }
    }
    None
}
