// SPDX-License-Identifier: Apache-2.0

//! Counters and gauges exposed by the pipeline runtime.
//!
//! The runtime owns the metric values only; transport is the small HTTP
//! helper in [`server`]. Three families exist:
//!
//! - `records_processed{stage, kind}` — monotone counter bumped by source and
//!   transform drivers and by sinks on successful flush,
//! - `records_dropped{stage}` — monotone counter bumped by transform drivers,
//! - `sink_state{stage, state}` — gauge where exactly the active state of a
//!   sink reads 1.

pub mod server;

use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

const NAMESPACE: &str = "loggraph";

/// `kind` label used by source drivers.
pub const KIND_SOURCE: &str = "source";
/// `kind` label used by transform drivers.
pub const KIND_TRANSFORM: &str = "transform";
/// `kind` label used by sink drivers on successful flush.
pub const KIND_SINK_SUCCESS: &str = "sink_success";

/// The registry holding every pipeline metric.
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static RECORDS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "records_processed",
            "How many records have passed through the given stage of the pipeline",
        )
        .namespace(NAMESPACE),
        &["stage", "kind"],
    )
    .expect("records_processed metric definition");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("records_processed registration");
    counter
});

static RECORDS_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "records_dropped",
            "The number of records dropped by the given transform stage",
        )
        .namespace(NAMESPACE),
        &["stage"],
    )
    .expect("records_dropped metric definition");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("records_dropped registration");
    counter
});

static SINK_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new(
            "sink_state",
            "1 when the given sink stage is in the given state, 0 otherwise",
        )
        .namespace(NAMESPACE),
        &["stage", "state"],
    )
    .expect("sink_state metric definition");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("sink_state registration");
    gauge
});

/// Health states a sink can report on the `sink_state` gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Flushes are succeeding.
    Healthy,
    /// A transient failure is being retried with backoff.
    Retrying,
    /// Retries are exhausted; flushes are gated by the long-failure cooldown.
    LongFailure,
}

impl SinkState {
    /// Every reportable state, used to zero the inactive gauge series.
    pub const ALL: [SinkState; 3] = [
        SinkState::Healthy,
        SinkState::Retrying,
        SinkState::LongFailure,
    ];

    /// The `state` label value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkState::Healthy => "healthy",
            SinkState::Retrying => "retrying",
            SinkState::LongFailure => "long_failure",
        }
    }
}

/// Adds `count` to `records_processed{stage, kind}`.
pub fn inc_records_processed(stage: &str, kind: &str, count: u64) {
    RECORDS_PROCESSED.with_label_values(&[stage, kind]).inc_by(count);
}

/// Adds `count` to `records_dropped{stage}`.
pub fn inc_records_dropped(stage: &str, count: u64) {
    RECORDS_DROPPED.with_label_values(&[stage]).inc_by(count);
}

/// Marks `active` as the current state of `stage`: its series reads 1 and
/// every other state reads 0.
pub fn set_sink_state(stage: &str, active: SinkState) {
    for state in SinkState::ALL {
        let value = i64::from(state == active);
        SINK_STATE
            .with_label_values(&[stage, state.as_str()])
            .set(value);
    }
}

/// Current value of `records_processed{stage, kind}`.
#[must_use]
pub fn records_processed(stage: &str, kind: &str) -> u64 {
    RECORDS_PROCESSED.with_label_values(&[stage, kind]).get()
}

/// Current value of `records_dropped{stage}`.
#[must_use]
pub fn records_dropped(stage: &str) -> u64 {
    RECORDS_DROPPED.with_label_values(&[stage]).get()
}

/// Current value of `sink_state{stage, state}`.
#[must_use]
pub fn sink_state(stage: &str, state: SinkState) -> i64 {
    SINK_STATE
        .with_label_values(&[stage, state.as_str()])
        .get()
}

/// Renders every registered metric in the Prometheus text format.
///
/// # Errors
///
/// Returns an error if text encoding fails.
pub fn render_text() -> Result<String, prometheus::Error> {
    use prometheus::{Encoder, TextEncoder};

    // Make sure all families exist even before the first data point.
    Lazy::force(&RECORDS_PROCESSED);
    Lazy::force(&RECORDS_DROPPED);
    Lazy::force(&SINK_STATE);

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    #![allow(missing_docs)]
    use super::*;

    #[test]
    fn counters_accumulate() {
        inc_records_processed("t_counter_stage", KIND_SOURCE, 3);
        inc_records_processed("t_counter_stage", KIND_SOURCE, 2);
        assert_eq!(records_processed("t_counter_stage", KIND_SOURCE), 5);

        inc_records_dropped("t_counter_stage", 1);
        assert_eq!(records_dropped("t_counter_stage"), 1);
    }

    #[test]
    fn exactly_one_sink_state_reads_one() {
        set_sink_state("t_state_stage", SinkState::Retrying);
        assert_eq!(sink_state("t_state_stage", SinkState::Retrying), 1);
        assert_eq!(sink_state("t_state_stage", SinkState::Healthy), 0);
        assert_eq!(sink_state("t_state_stage", SinkState::LongFailure), 0);

        set_sink_state("t_state_stage", SinkState::Healthy);
        assert_eq!(sink_state("t_state_stage", SinkState::Healthy), 1);
        assert_eq!(sink_state("t_state_stage", SinkState::Retrying), 0);
    }

    #[test]
    fn render_includes_namespaced_families() {
        inc_records_processed("t_render_stage", KIND_TRANSFORM, 1);
        let text = render_text().expect("render");
        assert!(text.contains("loggraph_records_processed"));
    }
}
