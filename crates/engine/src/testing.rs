// SPDX-License-Identifier: Apache-2.0

//! Scripted stages for exercising the runtime in tests.
//!
//! These implementations trade realism for determinism: sources emit
//! pre-built batches, sinks follow a scripted sequence of flush outcomes and
//! record everything they were handed.

use crate::error::StageError;
use crate::sink::{FlushOutcome, Sink};
use crate::source::Source;
use crate::transform::Transform;
use async_trait::async_trait;
use loggraph_record::{Batch, BatchPool, Record, Value};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builds one record per message payload.
#[must_use]
pub fn make_records(messages: &[&str]) -> Vec<Record> {
    messages.iter().map(|m| Record::from_message(*m)).collect()
}

/// Builds one record with a single extra field next to its payload.
#[must_use]
pub fn make_record_with_field(message: &str, key: &str, value: impl Into<Value>) -> Record {
    let mut record = Record::from_message(message);
    let _ = record.fields.insert(key.to_owned(), value.into());
    record
}

/// A source that emits scripted batches, then either ends its stream or
/// blocks until cancelled.
pub struct ScriptedSource {
    batches: VecDeque<Vec<Record>>,
    pace: Option<std::time::Duration>,
    block_after: bool,
}

impl ScriptedSource {
    /// Emits `batches` one per poll, then reports end-of-stream.
    #[must_use]
    pub fn finite(batches: Vec<Vec<Record>>) -> Self {
        ScriptedSource {
            batches: batches.into(),
            pace: None,
            block_after: false,
        }
    }

    /// Emits `batches`, then blocks until the cancel signal, mimicking a
    /// live source waiting on I/O.
    #[must_use]
    pub fn then_blocking(batches: Vec<Vec<Record>>) -> Self {
        ScriptedSource {
            batches: batches.into(),
            pace: None,
            block_after: true,
        }
    }

    /// Waits `pace` before each emission, then blocks until cancelled.
    #[must_use]
    pub fn paced(batches: Vec<Vec<Record>>, pace: std::time::Duration) -> Self {
        ScriptedSource {
            batches: batches.into(),
            pace: Some(pace),
            block_after: true,
        }
    }
}

#[async_trait]
impl Source for ScriptedSource {
    async fn initialize(&mut self) -> Result<(), StageError> {
        Ok(())
    }

    async fn next_batch(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Batch>, StageError> {
        if self.batches.is_empty() {
            if self.block_after {
                cancel.cancelled().await;
            }
            return Ok(None);
        }
        if let Some(pace) = self.pace {
            tokio::select! {
                () = tokio::time::sleep(pace) => {}
                () = cancel.cancelled() => return Ok(None),
            }
        }
        let records = self.batches.pop_front().expect("checked non-empty");
        let mut batch = BatchPool::global().acquire(records.len());
        for record in records {
            batch.push(record);
        }
        Ok(Some(batch))
    }

    async fn shutdown(&mut self) {}
}

/// A source whose initialization always fails.
pub struct FailingInitSource;

#[async_trait]
impl Source for FailingInitSource {
    async fn initialize(&mut self) -> Result<(), StageError> {
        Err("scripted initialization failure".into())
    }

    async fn next_batch(
        &mut self,
        _cancel: &CancellationToken,
    ) -> Result<Option<Batch>, StageError> {
        Ok(None)
    }

    async fn shutdown(&mut self) {}
}

/// A transform built from a plain predicate function.
pub struct PredicateTransform {
    predicate: fn(&Record) -> Result<bool, StageError>,
}

impl PredicateTransform {
    /// Drops every record for which `predicate` returns true.
    #[must_use]
    pub fn new(predicate: fn(&Record) -> Result<bool, StageError>) -> Self {
        PredicateTransform { predicate }
    }
}

impl Transform for PredicateTransform {
    fn should_drop(&mut self, record: &Record) -> Result<bool, StageError> {
        (self.predicate)(record)
    }
}

#[derive(Default)]
struct RecorderInner {
    /// Record sets delivered by successful flushes, in order.
    successes: Vec<Vec<Record>>,
    /// Total flush attempts, successful or not.
    attempts: usize,
    closed: bool,
}

/// Shared view on everything a scripted sink observed.
#[derive(Clone, Default)]
pub struct SinkRecorder {
    inner: Arc<Mutex<RecorderInner>>,
}

impl SinkRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        SinkRecorder::default()
    }

    /// All records delivered by successful flushes, flattened in order.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.inner.lock().successes.iter().flatten().cloned().collect()
    }

    /// Message payloads of every delivered record, in order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.records()
            .iter()
            .map(|r| r.message().map(ToString::to_string).unwrap_or_default())
            .collect()
    }

    /// Number of successful flushes.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.inner.lock().successes.len()
    }

    /// Number of flush attempts, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.inner.lock().attempts
    }

    /// Whether the sink's `close` ran.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.lock().closed
    }
}

/// A sink following a scripted sequence of flush outcomes.
pub struct ScriptedSink {
    recorder: SinkRecorder,
    script: VecDeque<FlushOutcome>,
    fallback: FlushOutcome,
}

impl ScriptedSink {
    /// A sink whose flushes always succeed.
    #[must_use]
    pub fn always_success(recorder: SinkRecorder) -> Self {
        ScriptedSink {
            recorder,
            script: VecDeque::new(),
            fallback: FlushOutcome::Success,
        }
    }

    /// A sink that replays `script` one outcome per flush, then succeeds.
    #[must_use]
    pub fn with_script(recorder: SinkRecorder, script: Vec<FlushOutcome>) -> Self {
        ScriptedSink {
            recorder,
            script: script.into(),
            fallback: FlushOutcome::Success,
        }
    }

    /// A sink that fails persistently on every flush.
    #[must_use]
    pub fn always_long_failure(recorder: SinkRecorder) -> Self {
        ScriptedSink {
            recorder,
            script: VecDeque::new(),
            fallback: FlushOutcome::long_failure("scripted long failure"),
        }
    }
}

#[async_trait]
impl Sink for ScriptedSink {
    async fn flush(&mut self, records: &[Record]) -> FlushOutcome {
        let outcome = self.script.pop_front().unwrap_or_else(|| self.fallback.clone());
        let mut inner = self.recorder.inner.lock();
        inner.attempts += 1;
        if outcome == FlushOutcome::Success {
            inner.successes.push(records.to_vec());
        }
        outcome
    }

    async fn close(&mut self) {
        self.recorder.inner.lock().closed = true;
    }
}

/// A sink whose flush never completes, for backpressure tests.
pub struct StuckSink;

#[async_trait]
impl Sink for StuckSink {
    async fn flush(&mut self, _records: &[Record]) -> FlushOutcome {
        futures::future::pending().await
    }

    async fn close(&mut self) {}
}
