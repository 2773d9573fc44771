// SPDX-License-Identifier: Apache-2.0

//! An ordered sequence of records transferred between stages as a unit.

use crate::record::Record;

/// A batch of records.
///
/// A batch is owned by exactly one stage at any instant; transferring it
/// through a channel is a move. On fan-out the runtime clones the batch
/// (deep copy, via [`Clone`]) for each additional edge so destinations may
/// mutate independently.
///
/// Batches carry no pointer back to the pool; whichever stage consumes a
/// batch for terminal processing returns it with [`crate::BatchPool::release`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    /// Creates an empty batch with at least the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Batch {
            records: Vec::with_capacity(capacity),
        }
    }

    /// Number of records in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current capacity of the underlying storage.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    /// Grows the capacity to hold at least `capacity` records in total.
    pub fn reserve_total(&mut self, capacity: usize) {
        if capacity > self.records.capacity() {
            self.records.reserve(capacity - self.records.len());
        }
    }

    /// Appends a record.
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Removes all records, keeping the allocation.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// The records in emission order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Mutable access to the records, for in-place filtering and rewriting
    /// by the owning stage.
    pub fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    /// Moves every record out of the batch, leaving it empty.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Record> {
        self.records.drain(..)
    }
}

impl FromIterator<Record> for Batch {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Batch {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    #![allow(missing_docs)]
    use super::*;
    use crate::record::Value;

    #[test]
    fn clone_is_deep() {
        let mut batch = Batch::with_capacity(2);
        batch.push(Record::from_message("a"));

        let mut copy = batch.clone();
        let _ = copy.records_mut()[0]
            .fields
            .insert("k".to_owned(), Value::from("mutated"));

        assert!(batch.records()[0].fields.get("k").is_none());
        assert!(copy.records()[0].fields.get("k").is_some());
    }

    #[test]
    fn reserve_total_grows_in_place() {
        let mut batch = Batch::with_capacity(4);
        batch.reserve_total(64);
        assert!(batch.capacity() >= 64);
        assert!(batch.is_empty());
    }

    #[test]
    fn drain_empties_but_keeps_allocation() {
        let mut batch = Batch::with_capacity(8);
        batch.push(Record::from_message("a"));
        batch.push(Record::from_message("b"));
        let drained: Vec<_> = batch.drain().collect();
        assert_eq!(drained.len(), 2);
        assert!(batch.is_empty());
        assert!(batch.capacity() >= 8);
    }
}
