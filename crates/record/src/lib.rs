// SPDX-License-Identifier: Apache-2.0

//! Record and batch model shared by every pipeline stage.
//!
//! A [`Record`] is one log line as structured key/value data stamped with a
//! monotonic timestamp. A [`Batch`] is an ordered sequence of records moved
//! between stages as a unit; batches are recycled through the process-wide
//! [`BatchPool`] by whichever stage consumed them.

pub mod batch;
pub mod pool;
pub mod record;

pub use batch::Batch;
pub use pool::BatchPool;
pub use record::{MESSAGE_FIELD, Record, Value};
