// SPDX-License-Identifier: Apache-2.0

//! Trait and driver for sink stages.
//!
//! A sink terminates a dataflow path. Its driver buffers incoming records
//! into one accumulating batch, flushes on size or time, retries transient
//! failures with exponential backoff, and diverts to the overflow edge after
//! persistent failure.
//!
//! # Failure semantics
//!
//! Transient errors retry inside the sink with backoff. Persistent errors
//! move the sink to the long-failure state: the buffer is diverted to the
//! overflow edge (when configured) and further flush attempts are gated to
//! one per cooldown interval. Record loss is possible only when overflow is
//! unconfigured and a persistent failure drains the buffer.

use crate::fanout::{BatchReceiver, BatchSender, recv_any, send_batch};
use async_trait::async_trait;
use loggraph_config::NodeSpec;
use loggraph_record::{Batch, BatchPool, Record};
use loggraph_telemetry::{
    KIND_SINK_SUCCESS, SinkState, inc_records_dropped, inc_records_processed, set_sink_state,
};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};
use tracing::{debug, warn};

/// Default size of the accumulating buffer.
pub const DEFAULT_MAX_BATCH: usize = 100;

/// Default interval between time-based flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Default total flush attempts before a transient failure is treated as a
/// long failure.
pub const DEFAULT_MAX_BACKOFF_TRIES: u32 = 5;

/// First backoff of the exponential retry ladder.
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Minimum spacing between flush attempts while in long failure.
const LONG_FAILURE_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// The verdict a sink returns for one flush attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The batch was delivered.
    Success,
    /// Delivery failed but retrying soon may succeed.
    Transient {
        /// Operator-facing description, logged not interpreted.
        reason: String,
    },
    /// Delivery failed and retrying soon will not help.
    LongFailure {
        /// Operator-facing description, logged not interpreted.
        reason: String,
    },
}

impl FlushOutcome {
    /// A transient failure described by `error`.
    #[must_use]
    pub fn transient(error: impl std::fmt::Display) -> Self {
        FlushOutcome::Transient {
            reason: error.to_string(),
        }
    }

    /// A persistent failure described by `error`.
    #[must_use]
    pub fn long_failure(error: impl std::fmt::Display) -> Self {
        FlushOutcome::LongFailure {
            reason: error.to_string(),
        }
    }
}

/// A capability delivering records to an external system.
#[async_trait]
pub trait Sink: Send {
    /// Attempts to deliver `records` in order.
    async fn flush(&mut self, records: &[Record]) -> FlushOutcome;

    /// Releases the sink's resources. Called exactly once, after the final
    /// flush.
    async fn close(&mut self);
}

/// Batching and retry configuration of one sink node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Interval between time-based flushes.
    pub flush_interval: Duration,
    /// Record count that forces a flush, and the buffer capacity.
    pub max_batch: usize,
    /// Total flush attempts (first try included) before long failure.
    pub max_backoff_tries: u32,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_batch: DEFAULT_MAX_BATCH,
            max_backoff_tries: DEFAULT_MAX_BACKOFF_TRIES,
        }
    }
}

impl SinkConfig {
    /// Reads the batching attributes (`flush_interval`, `max_batch`,
    /// `max_backoff_tries`) of a sink node, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the node when an attribute does
    /// not parse or `max_batch` is zero.
    pub fn from_node(node: &NodeSpec) -> Result<Self, loggraph_config::Error> {
        let mut config = SinkConfig::default();
        if let Some(interval) = node.duration_attr("flush_interval")? {
            if interval.is_zero() {
                return Err(loggraph_config::Error::InvalidAttribute {
                    node: node.name.clone(),
                    attribute: "flush_interval".to_owned(),
                    reason: "must be greater than zero".to_owned(),
                });
            }
            config.flush_interval = interval;
        }
        if let Some(max_batch) = node.parse_attr::<usize>("max_batch")? {
            if max_batch == 0 {
                return Err(loggraph_config::Error::InvalidAttribute {
                    node: node.name.clone(),
                    attribute: "max_batch".to_owned(),
                    reason: "must be at least 1".to_owned(),
                });
            }
            config.max_batch = max_batch;
        }
        if let Some(tries) = node.parse_attr::<u32>("max_backoff_tries")? {
            config.max_backoff_tries = tries;
        }
        Ok(config)
    }
}

/// Drives one sink node through the batch/flush/retry state machine.
pub struct SinkDriver {
    stage: String,
    sink: Box<dyn Sink>,
    inputs: Vec<BatchReceiver>,
    overflow: Option<BatchSender>,
    config: SinkConfig,
    buffer: Batch,
    state: SinkState,
    last_flush: Instant,
    last_retry: Option<Instant>,
}

impl SinkDriver {
    pub(crate) fn new(
        stage: String,
        sink: Box<dyn Sink>,
        inputs: Vec<BatchReceiver>,
        overflow: Option<BatchSender>,
        config: SinkConfig,
    ) -> Self {
        SinkDriver {
            stage,
            sink,
            inputs,
            overflow,
            config,
            buffer: Batch::default(),
            state: SinkState::Healthy,
            last_flush: Instant::now(),
            last_retry: None,
        }
    }

    /// Runs the driver until every in-edge reaches end-of-stream, then
    /// performs the final flush and closes the sink.
    pub async fn run(mut self) {
        debug!(stage = %self.stage, "sink started");
        set_sink_state(&self.stage, SinkState::Healthy);
        self.buffer = BatchPool::global().acquire(self.config.max_batch);
        self.last_flush = Instant::now();

        let mut inputs = std::mem::take(&mut self.inputs);
        let mut ticker = interval(self.config.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = recv_any(&mut inputs) => match received {
                    Some(batch) => self.queue_batch(batch).await,
                    None => break,
                },
                _ = ticker.tick() => self.flush_now(false).await,
            }
        }

        self.flush_now(true).await;
        BatchPool::global().release(std::mem::take(&mut self.buffer));
        self.sink.close().await;
        debug!(stage = %self.stage, "sink stopped");
    }

    /// Absorbs an incoming batch into the accumulating buffer, flushing
    /// whenever the buffer fills. One oversized batch may cause several
    /// flush cycles.
    async fn queue_batch(&mut self, mut incoming: Batch) {
        for record in incoming.drain() {
            if self.buffer.len() >= self.config.max_batch {
                self.flush_now(false).await;
            }
            self.buffer.push(record);
        }
        BatchPool::global().release(incoming);
    }

    /// One pass of the flush state machine.
    ///
    /// Proceeds only when `final_flush` is set, the buffer has reached
    /// `max_batch`, or a flush interval has elapsed. In long failure within
    /// the cooldown window the buffer is diverted without touching the sink.
    async fn flush_now(&mut self, final_flush: bool) {
        let now = Instant::now();
        let due = final_flush
            || self.buffer.len() >= self.config.max_batch
            || now.duration_since(self.last_flush) >= self.config.flush_interval;
        if !due || self.buffer.is_empty() {
            return;
        }

        if self.state == SinkState::LongFailure {
            if let Some(last_retry) = self.last_retry {
                if now.duration_since(last_retry) < LONG_FAILURE_RETRY_INTERVAL {
                    self.handle_long_failure().await;
                    return;
                }
            }
        }

        self.last_retry = Some(now);
        match self.sink.flush(self.buffer.records()).await {
            FlushOutcome::Success => self.flush_succeeded(),
            FlushOutcome::Transient { reason } => {
                warn!(stage = %self.stage, reason = %reason, "sink flush failed; retrying with backoff");
                if !self.exponential_retry().await {
                    self.handle_long_failure().await;
                }
            }
            FlushOutcome::LongFailure { reason } => {
                warn!(stage = %self.stage, reason = %reason, "sink flush failed persistently");
                self.handle_long_failure().await;
            }
        }
    }

    /// Retries the buffered flush with doubling backoff, starting at 100 ms,
    /// for at most `max_backoff_tries - 1` further attempts. Returns `true`
    /// when the sink recovered.
    async fn exponential_retry(&mut self) -> bool {
        self.set_state(SinkState::Retrying);
        let mut backoff = INITIAL_BACKOFF;

        for _ in 1..self.config.max_backoff_tries {
            sleep(backoff).await;
            self.last_retry = Some(Instant::now());
            match self.sink.flush(self.buffer.records()).await {
                FlushOutcome::Success => {
                    self.flush_succeeded();
                    return true;
                }
                FlushOutcome::Transient { reason } => {
                    warn!(stage = %self.stage, reason = %reason, ?backoff, "sink flush retry failed");
                    backoff *= 2;
                }
                FlushOutcome::LongFailure { reason } => {
                    warn!(stage = %self.stage, reason = %reason, "sink flush retry failed persistently");
                    return false;
                }
            }
        }
        false
    }

    /// Enters (or stays in) long failure: divert the buffer to the overflow
    /// edge when configured, otherwise count it as dropped, and clear it.
    async fn handle_long_failure(&mut self) {
        self.set_state(SinkState::LongFailure);
        if let Some(tx) = &self.overflow {
            if !self.buffer.is_empty() {
                let clone = BatchPool::global().clone_batch(&self.buffer);
                send_batch(&self.stage, tx, clone).await;
            }
        } else if !self.buffer.is_empty() {
            inc_records_dropped(&self.stage, self.buffer.len() as u64);
            warn!(
                stage = %self.stage,
                dropped = self.buffer.len(),
                "sink in long failure without overflow; dropping buffered records"
            );
        }
        self.buffer.clear();
    }

    fn flush_succeeded(&mut self) {
        inc_records_processed(&self.stage, KIND_SINK_SUCCESS, self.buffer.len() as u64);
        self.buffer.clear();
        self.last_flush = Instant::now();
        self.set_state(SinkState::Healthy);
    }

    fn set_state(&mut self, state: SinkState) {
        if self.state != state {
            self.state = state;
            set_sink_state(&self.stage, state);
        }
    }
}

