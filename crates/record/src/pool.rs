// SPDX-License-Identifier: Apache-2.0

//! Process-wide pool of reusable batches.
//!
//! The pool is size-classed: free batches are kept on per-class free lists
//! (powers of two), each behind its own mutex, so that the large accumulation
//! buffers used by sinks do not churn against the small transient batches
//! produced by sources. A single global lock would be correct but is ruled
//! out for contention.

use crate::batch::Batch;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Smallest batch capacity handed out by the pool.
const MIN_CLASS_CAPACITY: usize = 16;

/// Largest size class; bigger hints are served exactly and recycled into the
/// top class.
const MAX_CLASS_CAPACITY: usize = 16_384;

/// Maximum free batches retained per class. Releases beyond this are dropped.
const CLASS_HI_WATERMARK: usize = 32;

const NUM_CLASSES: usize =
    (MAX_CLASS_CAPACITY.ilog2() - MIN_CLASS_CAPACITY.ilog2() + 1) as usize;

/// A concurrent-safe, size-classed pool of [`Batch`] values.
pub struct BatchPool {
    classes: [Mutex<Vec<Batch>>; NUM_CLASSES],
    outstanding: AtomicUsize,
}

impl BatchPool {
    /// Creates an empty pool. Most callers want [`BatchPool::global`].
    #[must_use]
    pub fn new() -> Self {
        BatchPool {
            classes: std::array::from_fn(|_| Mutex::new(Vec::new())),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// The process-wide pool shared by every driver.
    #[must_use]
    pub fn global() -> &'static BatchPool {
        static POOL: Lazy<BatchPool> = Lazy::new(BatchPool::new);
        &POOL
    }

    /// Takes a batch from the pool with `len == 0` and capacity at least
    /// `capacity_hint`, allocating one if the matching class is empty.
    ///
    /// If the pooled entry is smaller than the hint it is grown in place.
    #[must_use]
    pub fn acquire(&self, capacity_hint: usize) -> Batch {
        let _ = self.outstanding.fetch_add(1, Ordering::Relaxed);

        let class = class_index(capacity_hint);
        let recycled = self.classes[class].lock().pop();
        match recycled {
            Some(mut batch) => {
                batch.reserve_total(capacity_hint);
                batch
            }
            None => Batch::with_capacity(capacity_hint.max(MIN_CLASS_CAPACITY)),
        }
    }

    /// Clears the batch and returns it to its size class.
    ///
    /// Classes retain at most a fixed number of free entries; a release into
    /// a full class drops the batch instead, so the pool's footprint stays
    /// bounded without ever evicting entries already held.
    pub fn release(&self, mut batch: Batch) {
        let previous = self.outstanding.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0, "pool release without matching acquire");

        batch.clear();
        let class = class_index(batch.capacity());
        let mut shard = self.classes[class].lock();
        if shard.len() < CLASS_HI_WATERMARK {
            shard.push(batch);
        }
    }

    /// Deep-copies `batch` into a batch acquired from this pool.
    ///
    /// Used on fan-out: the copy and the original own disjoint records, and
    /// both remain paired with the pool for release accounting.
    #[must_use]
    pub fn clone_batch(&self, batch: &Batch) -> Batch {
        let mut copy = self.acquire(batch.len());
        copy.records_mut().extend_from_slice(batch.records());
        copy
    }

    /// Number of batches acquired and not yet released.
    ///
    /// Zero after a pipeline has fully drained.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Total free batches currently retained, across all classes.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.classes.iter().map(|c| c.lock().len()).sum()
    }
}

impl Default for BatchPool {
    fn default() -> Self {
        BatchPool::new()
    }
}

fn class_index(capacity: usize) -> usize {
    let clamped = capacity
        .next_power_of_two()
        .clamp(MIN_CLASS_CAPACITY, MAX_CLASS_CAPACITY);
    (clamped.ilog2() - MIN_CLASS_CAPACITY.ilog2()) as usize
}

#[cfg(test)]
mod tests {
    #![allow(missing_docs)]
    use super::*;
    use crate::record::Record;

    #[test]
    fn acquire_meets_capacity_hint() {
        let pool = BatchPool::new();
        let batch = pool.acquire(100);
        assert!(batch.capacity() >= 100);
        assert_eq!(batch.len(), 0);
        pool.release(batch);
    }

    #[test]
    fn release_recycles_into_matching_class() {
        let pool = BatchPool::new();
        let mut batch = pool.acquire(64);
        batch.push(Record::from_message("x"));
        pool.release(batch);

        let again = pool.acquire(64);
        assert_eq!(again.len(), 0, "recycled batch must come back empty");
        assert!(again.capacity() >= 64);
        assert_eq!(pool.free_count(), 0);
        pool.release(again);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn undersized_entry_grows_in_place() {
        let pool = BatchPool::new();
        // Seed the 64-class with an entry whose capacity is below a later
        // hint in the same class.
        pool.release(pool.acquire(40));
        let batch = pool.acquire(60);
        assert!(batch.capacity() >= 60);
        pool.release(batch);
    }

    #[test]
    fn outstanding_tracks_live_batches() {
        let pool = BatchPool::new();
        let a = pool.acquire(16);
        let b = pool.acquire(16);
        assert_eq!(pool.outstanding(), 2);
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn class_retention_is_bounded() {
        let pool = BatchPool::new();
        let live: Vec<_> = (0..CLASS_HI_WATERMARK + 10)
            .map(|_| pool.acquire(32))
            .collect();
        for batch in live {
            pool.release(batch);
        }
        assert!(pool.free_count() <= CLASS_HI_WATERMARK);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn oversized_hints_use_top_class() {
        let pool = BatchPool::new();
        let batch = pool.acquire(MAX_CLASS_CAPACITY * 4);
        assert!(batch.capacity() >= MAX_CLASS_CAPACITY * 4);
        pool.release(batch);
        assert_eq!(pool.free_count(), 1);
    }
}
