// SPDX-License-Identifier: Apache-2.0

//! Token-bucket rate limiting, partitioned by a record field.
//!
//! Each distinct value of the partition key owns one bucket holding at most
//! `rate` tokens, refilled continuously at `rate` tokens per second with
//! microsecond granularity. A record that finds no token in its bucket is
//! dropped. Buckets start full so a quiet partition may burst.

use linkme::distributed_slice;
use loggraph_config::NodeSpec;
use loggraph_engine::{StageError, TRANSFORM_FACTORIES, Transform, TransformFactory};
use loggraph_record::Record;
use std::collections::HashMap;
use std::time::Instant;

const MICROS_PER_SEC: i64 = 1_000_000;

#[derive(Debug)]
struct TokenBucket {
    tokens: i64,
    rate: i64,
    last_check: Instant,
}

impl TokenBucket {
    fn new(rate: i64) -> Self {
        TokenBucket {
            tokens: rate,
            rate,
            last_check: Instant::now(),
        }
    }

    fn add_new_tokens(&mut self) {
        let micros_since_check = self.last_check.elapsed().as_micros() as i64;
        let new_tokens = micros_since_check * self.rate / MICROS_PER_SEC;

        if new_tokens > 0 {
            self.tokens = (self.tokens + new_tokens).min(self.rate);
            self.last_check = Instant::now();
        }
    }

    fn try_consume(&mut self) -> bool {
        if self.tokens >= 1 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }
}

/// A transform dropping records that exceed a per-partition rate.
#[derive(Debug)]
pub struct RateLimitTransform {
    partition_key: String,
    rate: i64,
    buckets: HashMap<String, TokenBucket>,
}

impl RateLimitTransform {
    /// Builds the transform from its node attributes: `partition_key` and a
    /// positive integer `rate`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the node when either attribute
    /// is missing or invalid.
    pub fn from_node(node: &NodeSpec) -> Result<Self, loggraph_config::Error> {
        let partition_key = node.require_attr("partition_key")?.to_owned();
        let rate = node
            .parse_attr::<i64>("rate")?
            .ok_or_else(|| loggraph_config::Error::MissingAttribute {
                node: node.name.clone(),
                attribute: "rate".to_owned(),
            })?;
        if rate <= 0 {
            return Err(loggraph_config::Error::InvalidAttribute {
                node: node.name.clone(),
                attribute: "rate".to_owned(),
                reason: format!("expected a positive integer, got {rate}"),
            });
        }
        Ok(RateLimitTransform {
            partition_key,
            rate,
            buckets: HashMap::new(),
        })
    }

    fn partition_of(&self, record: &Record) -> String {
        record
            .fields
            .get(&self.partition_key)
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

impl Transform for RateLimitTransform {
    fn should_drop(&mut self, record: &Record) -> Result<bool, StageError> {
        let key = self.partition_of(record);
        let rate = self.rate;
        let bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(rate));
        bucket.add_new_tokens();
        Ok(!bucket.try_consume())
    }
}

#[distributed_slice(TRANSFORM_FACTORIES)]
static RATELIMIT_TRANSFORM: TransformFactory = TransformFactory {
    name: "ratelimit",
    create: |node| Ok(Box::new(RateLimitTransform::from_node(node)?)),
};

#[cfg(test)]
mod tests {
    #![allow(missing_docs)]
    use super::*;
    use loggraph_config::PipelineSpec;

    fn node(attrs: &str) -> NodeSpec {
        let text = format!(r#"digraph {{ rl [type="ratelimit", {attrs}]; }}"#);
        PipelineSpec::parse(&text).expect("parse").nodes["rl"].clone()
    }

    fn keyed(key: &str) -> Record {
        let mut record = Record::new();
        let _ = record
            .fields
            .insert("k".to_owned(), loggraph_record::Value::from(key));
        record
    }

    #[test]
    fn second_record_in_partition_is_dropped() {
        let mut rl =
            RateLimitTransform::from_node(&node(r#"partition_key="k", rate="1""#)).expect("build");

        assert!(!rl.should_drop(&keyed("x")).expect("first x"));
        assert!(rl.should_drop(&keyed("x")).expect("second x"));
        assert!(!rl.should_drop(&keyed("y")).expect("first y"));
    }

    #[test]
    fn missing_partition_field_shares_one_bucket() {
        let mut rl =
            RateLimitTransform::from_node(&node(r#"partition_key="k", rate="1""#)).expect("build");

        assert!(!rl.should_drop(&Record::new()).expect("first"));
        assert!(rl.should_drop(&Record::new()).expect("second"));
    }

    #[test]
    fn rate_must_be_positive() {
        let err = RateLimitTransform::from_node(&node(r#"partition_key="k", rate="0""#))
            .expect_err("zero rate");
        assert!(matches!(
            err,
            loggraph_config::Error::InvalidAttribute { attribute, .. } if attribute == "rate"
        ));
    }

    #[test]
    fn missing_attributes_are_rejected() {
        let err = RateLimitTransform::from_node(&node(r#"rate="5""#)).expect_err("no key");
        assert!(matches!(
            err,
            loggraph_config::Error::MissingAttribute { attribute, .. } if attribute == "partition_key"
        ));
    }
}
