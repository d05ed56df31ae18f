//! Event bus adapter: an ordered-per-key, at-least-once log of hit events.
//!
//! The producer side is non-blocking from the redirect path's perspective:
//! publishes happen on a background task with a bounded retry schedule, and
//! exhaustion drops the event with a metric increment rather than failing
//! anything upstream.

use crate::config::KafkaConfig;
use crate::error::{AppError, AppResult};
use crate::metrics::AppMetrics;
use crate::models::HitEvent;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::warn;

/// Initial backoff before the first publish retry.
const RETRY_INITIAL: Duration = Duration::from_millis(300);
/// Publish attempts before the event is dropped.
const MAX_ATTEMPTS: u32 = 8;
/// Ceiling on a single backoff sleep.
const RETRY_CAP: Duration = Duration::from_secs(5);
/// Overall deadline for one event's publish, retries included.
const PUBLISH_DEADLINE: Duration = Duration::from_secs(30);
/// Per-attempt producer acknowledgement timeout.
const SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Hit event producer keyed by short code.
#[derive(Clone)]
pub struct EventBus {
    producer: FutureProducer,
    topic: String,
    metrics: &'static AppMetrics,
}

impl EventBus {
    pub fn new(
        bootstrap_servers: &str,
        topic: &str,
        metrics: &'static AppMetrics,
    ) -> AppResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", "2000")
            .set("queue.buffering.max.messages", "100000")
            .set("queue.buffering.max.ms", "5")
            .create()
            .map_err(AppError::EventBus)?;
        Ok(Self {
            producer,
            topic: topic.to_string(),
            metrics,
        })
    }

    /// Name of the dead-letter topic paired with the hits topic.
    pub fn dead_letter_topic(&self) -> String {
        format!("{}.dlq", self.topic)
    }

    /// Publish a hit event, keyed by code so per-code ordering holds.
    ///
    /// Returns true on acknowledged delivery. On saturation the publish
    /// degrades to a bounded retry; after exhaustion the event is dropped
    /// and the drop counter incremented. Never propagates errors.
    pub async fn publish(&self, event: &HitEvent) -> bool {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                warn!(code = %event.code, "hit event serialization failed: {e}");
                self.metrics.hits_publish_dropped_total.inc();
                return false;
            }
        };

        let attempt_all = async {
            let mut backoff = RETRY_INITIAL;
            for attempt in 1..=MAX_ATTEMPTS {
                let record = FutureRecord::to(&self.topic)
                    .payload(&payload)
                    .key(&event.code);
                match self.producer.send(record, SEND_TIMEOUT).await {
                    Ok(_) => return true,
                    Err((e, _)) => {
                        warn!(
                            code = %event.code,
                            attempt,
                            "hit event publish failed: {e}"
                        );
                    }
                }
                if attempt < MAX_ATTEMPTS {
                    // Jitter keeps a fleet of producers from retrying in sync.
                    let jitter = Duration::from_millis(rand::random::<u64>() % 100);
                    tokio::time::sleep(backoff + jitter).await;
                    backoff = (backoff * 2).min(RETRY_CAP);
                }
            }
            false
        };

        let delivered = tokio::time::timeout(PUBLISH_DEADLINE, attempt_all)
            .await
            .unwrap_or(false);

        if delivered {
            self.metrics.hits_published_total.inc();
        } else {
            self.metrics.hits_publish_dropped_total.inc();
        }
        delivered
    }

    /// Route an unprocessable payload to the dead-letter topic.
    /// Best-effort: a DLQ failure is logged, not retried.
    pub async fn publish_dead_letter(&self, key: &str, payload: &[u8]) -> bool {
        let topic = self.dead_letter_topic();
        let record = FutureRecord::to(&topic).payload(payload).key(key);
        match self.producer.send(record, SEND_TIMEOUT).await {
            Ok(_) => {
                self.metrics.consumer_dlq_total.inc();
                true
            }
            Err((e, _)) => {
                warn!(key, "dead-letter publish failed: {e}");
                false
            }
        }
    }
}

/// Build the consumer-group member for the hits topic.
///
/// Offsets are committed manually, after successful application, so a
/// crashed instance replays its uncommitted tail (at-least-once).
pub fn create_consumer(config: &KafkaConfig) -> AppResult<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("group.id", &config.consumer_group)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("session.timeout.ms", "30000")
        .set("heartbeat.interval.ms", "3000")
        .set("max.poll.interval.ms", "60000")
        .create()
        .map_err(AppError::EventBus)?;
    consumer
        .subscribe(&[&config.topic_hits])
        .map_err(AppError::EventBus)?;
    Ok(consumer)
}
