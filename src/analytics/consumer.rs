//! Analytics consumer: drains the hits topic into the counter store.
//!
//! Delivery is at-least-once. A batch is applied with bounded concurrency
//! and settled in full before its offsets are committed, so a crash replays
//! the uncommitted tail; duplicate applies overcount commutative counters
//! but never grow the unique-visitor set.

use crate::config::KafkaConfig;
use crate::error::{AppError, AppResult};
use crate::events::{self, EventBus};
use crate::metrics::AppMetrics;
use crate::models::HitEvent;
use chrono::{Duration as ChronoDuration, Utc};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Message, OwnedMessage};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::store::AnalyticsStore;

/// Events older than this are rejected as stale.
const MAX_EVENT_AGE_HOURS: i64 = 24;
/// Events further in the future than this are rejected as clock skew.
const MAX_EVENT_SKEW_MINUTES: i64 = 5;
/// Poll timeout while filling a batch that already has members.
const BATCH_FILL_TIMEOUT: Duration = Duration::from_millis(250);
/// Attempts to apply one event before it is declared poisoned.
const APPLY_ATTEMPTS: u32 = 3;
/// How often the TTL sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Observable lifecycle of a consumer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsumerState {
    Idle,
    Subscribing,
    Running,
    Draining,
    Stopped,
}

pub struct AnalyticsConsumer {
    consumer: StreamConsumer,
    store: AnalyticsStore,
    bus: EventBus,
    batch_size: usize,
    max_in_flight: usize,
    metrics: &'static AppMetrics,
}

impl AnalyticsConsumer {
    /// Join the consumer group and subscribe to the hits topic.
    pub fn new(
        config: &KafkaConfig,
        store: AnalyticsStore,
        bus: EventBus,
        metrics: &'static AppMetrics,
    ) -> AppResult<Self> {
        Self::log_state(ConsumerState::Idle);
        Self::log_state(ConsumerState::Subscribing);
        let consumer = events::create_consumer(config)?;
        Ok(Self {
            consumer,
            store,
            bus,
            batch_size: config.consumer_batch_size,
            max_in_flight: config.consumer_max_in_flight,
            metrics,
        })
    }

    fn log_state(state: ConsumerState) {
        info!(state = ?state, "analytics consumer state");
    }

    /// Run until the shutdown future resolves, then drain: finish the
    /// in-flight batch, commit its offsets, and stop.
    pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) {
        Self::log_state(ConsumerState::Running);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    Self::log_state(ConsumerState::Draining);
                    break;
                }
                batch = self.collect_batch() => {
                    match batch {
                        Ok(messages) if messages.is_empty() => {}
                        Ok(messages) => self.process_batch(messages).await,
                        Err(e) => {
                            warn!("consumer poll error: {e}");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        Self::log_state(ConsumerState::Stopped);
    }

    /// Collect up to `batch_size` messages; returns early once the stream
    /// goes quiet so near-empty batches still flush promptly.
    async fn collect_batch(&self) -> AppResult<Vec<OwnedMessage>> {
        let mut messages = Vec::with_capacity(self.batch_size);

        let first = self.consumer.recv().await.map_err(AppError::EventBus)?;
        messages.push(first.detach());

        while messages.len() < self.batch_size {
            match tokio::time::timeout(BATCH_FILL_TIMEOUT, self.consumer.recv()).await {
                Ok(Ok(msg)) => messages.push(msg.detach()),
                Ok(Err(e)) => {
                    warn!("consumer recv error while batching: {e}");
                    break;
                }
                Err(_) => break,
            }
        }

        Ok(messages)
    }

    /// Apply one batch with allSettled semantics: one poisoned event never
    /// halts the rest, and offsets advance only after every member settled.
    async fn process_batch(&self, messages: Vec<OwnedMessage>) {
        self.metrics
            .consumer_events_total
            .inc_by(messages.len() as u64);

        // Highest offset per partition, committed after the batch settles.
        let mut high_water: HashMap<(String, i32), i64> = HashMap::new();
        for msg in &messages {
            let entry = high_water
                .entry((msg.topic().to_string(), msg.partition()))
                .or_insert(msg.offset());
            *entry = (*entry).max(msg.offset());
        }

        let mut tasks: JoinSet<()> = JoinSet::new();
        for msg in messages {
            if tasks.len() >= self.max_in_flight {
                tasks.join_next().await;
            }

            let store = self.store.clone();
            let bus = self.bus.clone();
            let metrics = self.metrics;
            tasks.spawn(async move {
                let payload = msg.payload().unwrap_or_default().to_vec();
                let key = msg
                    .key()
                    .map(|k| String::from_utf8_lossy(k).into_owned())
                    .unwrap_or_default();

                let event = match decode_and_validate(&payload) {
                    Ok(event) => event,
                    Err(reason) => {
                        warn!(key = %key, reason, "rejecting hit event");
                        metrics.consumer_rejected_total.inc();
                        bus.publish_dead_letter(&key, &payload).await;
                        return;
                    }
                };

                match apply_with_retry(&store, &event).await {
                    Ok(()) => metrics.consumer_applied_total.inc(),
                    Err(e) => {
                        error!(code = %event.code, "hit event poisoned after retries: {e}");
                        bus.publish_dead_letter(&event.code, &payload).await;
                    }
                }
            });
        }

        while tasks.join_next().await.is_some() {}

        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), offset) in high_water {
            // Committed offset points at the next message to consume.
            let _ = tpl.add_partition_offset(&topic, partition, Offset::Offset(offset + 1));
        }
        if let Err(e) = self.consumer.commit(&tpl, CommitMode::Async) {
            warn!("offset commit failed: {e}");
        }
    }
}

/// Decode a payload and check the required fields and tolerance window.
fn decode_and_validate(payload: &[u8]) -> Result<HitEvent, &'static str> {
    let event: HitEvent = serde_json::from_slice(payload).map_err(|_| "undecodable payload")?;

    if event.code.is_empty() || event.ip.is_empty() || event.user_agent.is_empty() {
        return Err("missing required fields");
    }

    let now = Utc::now();
    if event.timestamp < now - ChronoDuration::hours(MAX_EVENT_AGE_HOURS) {
        return Err("timestamp too old");
    }
    if event.timestamp > now + ChronoDuration::minutes(MAX_EVENT_SKEW_MINUTES) {
        return Err("timestamp in the future");
    }

    Ok(event)
}

/// The store's batch is commutative, so transient failures retry safely.
async fn apply_with_retry(store: &AnalyticsStore, event: &HitEvent) -> AppResult<()> {
    let mut last_err = None;
    for attempt in 1..=APPLY_ATTEMPTS {
        match store.apply_hit(event).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if attempt < APPLY_ATTEMPTS {
                    tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| AppError::Internal("apply failed".to_string())))
}

/// Periodically enforce the analytics column-family TTLs.
pub fn spawn_ttl_sweeper(store: AnalyticsStore) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match store.sweep_expired().await {
                Ok((minutes, visitors)) => {
                    if minutes > 0 || visitors > 0 {
                        info!(minutes, visitors, "analytics TTL sweep removed rows");
                    }
                }
                Err(e) => warn!("analytics TTL sweep failed: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_json(timestamp: chrono::DateTime<Utc>) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "code": "abc123X",
            "timestamp": timestamp,
            "ip": "203.0.113.9",
            "user_agent": "Mozilla/5.0",
        }))
        .unwrap()
    }

    #[test]
    fn test_current_event_is_accepted() {
        let event = decode_and_validate(&event_json(Utc::now())).unwrap();
        assert_eq!(event.code, "abc123X");
    }

    #[test]
    fn test_stale_event_is_rejected() {
        let stale = Utc::now() - ChronoDuration::hours(25);
        assert_eq!(
            decode_and_validate(&event_json(stale)).unwrap_err(),
            "timestamp too old"
        );
    }

    #[test]
    fn test_future_event_is_rejected() {
        let future = Utc::now() + ChronoDuration::minutes(10);
        assert_eq!(
            decode_and_validate(&event_json(future)).unwrap_err(),
            "timestamp in the future"
        );
    }

    #[test]
    fn test_slight_skew_is_tolerated() {
        let skewed = Utc::now() + ChronoDuration::minutes(4);
        assert!(decode_and_validate(&event_json(skewed)).is_ok());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let payload = serde_json::to_vec(&serde_json::json!({
            "code": "",
            "timestamp": Utc::now(),
            "ip": "203.0.113.9",
            "user_agent": "Mozilla/5.0",
        }))
        .unwrap();
        assert_eq!(
            decode_and_validate(&payload).unwrap_err(),
            "missing required fields"
        );
    }

    #[test]
    fn test_garbage_payload_rejected() {
        assert_eq!(
            decode_and_validate(b"not json at all").unwrap_err(),
            "undecodable payload"
        );
    }
}
