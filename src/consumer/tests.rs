use super::worker::{Outcome, Worker};
use super::{AckMode, ConsumerPool, PoolOptions};
use crate::broker::{BrokerKind, BrokerTransport, MemoryBroker, Subscription};
use crate::event::{Codec, Weather, WeatherEvent};
use crate::persistence::{AggregateStore, Aggregates, Counter, MemoryStore, TotalLayout};
use crate::utils::error::StoreError;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const TOPIC: &str = "message";
const GROUP: &str = "test-consumers";

fn setup() -> (MemoryBroker, Arc<MemoryStore>, Aggregates) {
    let broker = MemoryBroker::new(BrokerKind::RabbitMq, "memory://rabbitmq");
    let store = Arc::new(MemoryStore::new());
    let aggregates = Aggregates::new(store.clone(), TotalLayout::Scalar);
    (broker, store, aggregates)
}

fn options(workers: usize, ack_mode: AckMode) -> PoolOptions {
    PoolOptions {
        topic: TOPIC.to_string(),
        group: GROUP.to_string(),
        workers,
        ack_mode,
        nack_delay: Duration::from_millis(1),
        ..PoolOptions::for_broker(BrokerKind::RabbitMq)
    }
}

async fn worker(broker: &MemoryBroker, aggregates: &Aggregates, ack_mode: AckMode) -> Worker {
    Worker {
        index: 0,
        kind: BrokerKind::RabbitMq,
        codec: Codec::Delimited,
        ack_mode,
        nack_delay: Duration::from_millis(1),
        subscription: broker.subscribe(TOPIC, GROUP).await.unwrap(),
        aggregates: aggregates.clone(),
    }
}

/// Polls until `total_messages` reaches `expected` or a second passes.
async fn wait_for_total(aggregates: &Aggregates, expected: i64) -> i64 {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        let total = aggregates.total().await.unwrap();
        if total >= expected || tokio::time::Instant::now() >= deadline {
            return total;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Memory store whose first `failures` counter updates error out.
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicU32,
}

impl FlakyStore {
    fn new(failures: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures: AtomicU32::new(failures),
        }
    }

    fn fail(&self) -> Result<(), StoreError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl AggregateStore for FlakyStore {
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.fail()?;
        self.inner.incr(key, delta).await
    }

    async fn hincr(&self, hash: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        self.fail()?;
        self.inner.hincr(hash, field, delta).await
    }

    async fn incr_all(&self, counters: &[Counter<'_>], delta: i64) -> Result<(), StoreError> {
        self.fail()?;
        self.inner.incr_all(counters, delta).await
    }

    async fn hset_all(&self, hash: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        self.inner.hset_all(hash, fields).await
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.inner.get(key).await
    }

    async fn hget(&self, hash: &str, field: &str) -> Result<Option<i64>, StoreError> {
        self.inner.hget(hash, field).await
    }

    async fn hgetall(&self, hash: &str) -> Result<HashMap<String, i64>, StoreError> {
        self.inner.hgetall(hash).await
    }

    async fn hgetall_text(&self, hash: &str) -> Result<HashMap<String, String>, StoreError> {
        self.inner.hgetall_text(hash).await
    }
}

#[test]
fn test_pool_options_follow_broker_defaults() {
    let kafka = PoolOptions::for_broker(BrokerKind::Kafka);
    assert_eq!(kafka.group, "kafka-consumer-group");
    assert_eq!(kafka.codec, Codec::KeyValue);
    assert_eq!(kafka.workers, 10);
    assert_eq!(kafka.ack_mode, AckMode::AfterStore);
}

#[tokio::test]
async fn test_worker_aggregates_valid_message() {
    let (broker, _store, aggregates) = setup();
    let mut worker = worker(&broker, &aggregates, AckMode::AfterStore).await;
    broker.publish(TOPIC, "FR", "rain|FR|Lluvioso").await.unwrap();

    let delivery = worker.subscription.next().await.unwrap();
    assert_eq!(worker.handle(delivery).await, Outcome::Aggregated);

    assert_eq!(aggregates.country("FR").await.unwrap(), 1);
    assert_eq!(aggregates.total().await.unwrap(), 1);
    assert_eq!(broker.pending_count(), 0);
}

#[tokio::test]
async fn test_worker_drops_malformed_message() {
    let (broker, _store, aggregates) = setup();
    let mut worker = worker(&broker, &aggregates, AckMode::AfterStore).await;
    broker
        .publish(TOPIC, "", "bad-payload-no-separators")
        .await
        .unwrap();

    let delivery = worker.subscription.next().await.unwrap();
    assert_eq!(worker.handle(delivery).await, Outcome::Malformed);

    assert!(aggregates.country_counts().await.unwrap().is_empty());
    assert_eq!(aggregates.total().await.unwrap(), 0);
    // dropped for good, not left for redelivery
    assert_eq!(broker.pending_count(), 0);
}

#[tokio::test]
async fn test_store_failure_nacks_after_store_mode() {
    let (broker, store, aggregates) = setup();
    let mut worker = worker(&broker, &aggregates, AckMode::AfterStore).await;
    broker.publish(TOPIC, "GT", "sun|GT|Soleado").await.unwrap();

    store.set_available(false);
    let delivery = worker.subscription.next().await.unwrap();
    assert_eq!(worker.handle(delivery).await, Outcome::StoreFailed);

    store.set_available(true);
    let redelivery = worker.subscription.next().await.unwrap();
    assert!(redelivery.redelivered);
    assert_eq!(worker.handle(redelivery).await, Outcome::Aggregated);
    assert_eq!(aggregates.country("GT").await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_update_then_redelivery_keeps_counters_consistent() {
    let broker = MemoryBroker::new(BrokerKind::RabbitMq, "memory://rabbitmq");
    let store = Arc::new(FlakyStore::new(1));
    let aggregates = Aggregates::new(store.clone(), TotalLayout::Scalar);
    let mut worker = worker(&broker, &aggregates, AckMode::AfterStore).await;
    broker.publish(TOPIC, "FR", "rain|FR|Lluvioso").await.unwrap();

    let delivery = worker.subscription.next().await.unwrap();
    assert_eq!(worker.handle(delivery).await, Outcome::StoreFailed);
    assert_eq!(aggregates.country("FR").await.unwrap(), 0);
    assert_eq!(aggregates.total().await.unwrap(), 0);

    let redelivery = worker.subscription.next().await.unwrap();
    assert_eq!(worker.handle(redelivery).await, Outcome::Aggregated);

    assert_eq!(aggregates.country("FR").await.unwrap(), 1);
    assert_eq!(aggregates.total().await.unwrap(), 1);
    let counts = aggregates.country_counts().await.unwrap();
    assert_eq!(counts.values().sum::<i64>(), aggregates.total().await.unwrap());
    assert_eq!(broker.pending_count(), 0);
}

#[tokio::test]
async fn test_worker_stores_event_record_before_counting() {
    let (broker, store, aggregates) = setup();
    let aggregates = aggregates.with_event_records(true);
    let mut worker = worker(&broker, &aggregates, AckMode::AfterStore).await;
    broker.publish(TOPIC, "GT", "sun|GT|Soleado").await.unwrap();

    let delivery = worker.subscription.next().await.unwrap();
    assert_eq!(worker.handle(delivery).await, Outcome::Aggregated);

    let records = store.text_hashes("weather_tweet:");
    assert_eq!(records.len(), 1);
    let fields = store.hgetall_text(&records[0]).await.unwrap();
    assert_eq!(fields["Description"], "sun");
    assert_eq!(fields["Country"], "GT");
    assert_eq!(fields["Weather"], "Soleado");
    assert_eq!(aggregates.country("GT").await.unwrap(), 1);
}

#[tokio::test]
async fn test_store_failure_loses_message_on_receive_mode() {
    let (broker, store, aggregates) = setup();
    let mut worker = worker(&broker, &aggregates, AckMode::OnReceive).await;
    broker.publish(TOPIC, "GT", "sun|GT|Soleado").await.unwrap();

    store.set_available(false);
    let delivery = worker.subscription.next().await.unwrap();
    assert_eq!(worker.handle(delivery).await, Outcome::StoreFailed);
    assert_eq!(broker.pending_count(), 0);

    let nothing =
        tokio::time::timeout(Duration::from_millis(50), worker.subscription.next()).await;
    assert!(nothing.is_err(), "auto-acked message must not come back");
}

#[tokio::test]
async fn test_concurrent_workers_lose_no_updates() {
    let (broker, _store, aggregates) = setup();
    let workers = 8;
    let messages = 200;

    let pool = ConsumerPool::new(
        options(workers, AckMode::AfterStore),
        Arc::new(broker.clone()),
        aggregates.clone(),
    )
    .start()
    .await
    .unwrap();
    assert_eq!(pool.len(), workers);

    let codec = Codec::Delimited;
    for i in 0..messages {
        let event = WeatherEvent::new(format!("report {i}"), "FR", Weather::Nublado);
        broker.publish(TOPIC, "FR", &codec.encode(&event)).await.unwrap();
    }

    assert_eq!(wait_for_total(&aggregates, messages).await, messages);
    assert_eq!(aggregates.country("FR").await.unwrap(), messages);

    broker.close();
    pool.join().await;
}

#[tokio::test]
async fn test_pool_survives_malformed_messages() {
    let (broker, _store, aggregates) = setup();
    let pool = ConsumerPool::new(
        options(2, AckMode::AfterStore),
        Arc::new(broker.clone()),
        aggregates.clone(),
    )
    .start()
    .await
    .unwrap();

    broker
        .publish(TOPIC, "", "bad-payload-no-separators")
        .await
        .unwrap();
    broker.publish(TOPIC, "DE", "wind|DE|Nublado").await.unwrap();

    assert_eq!(wait_for_total(&aggregates, 1).await, 1);
    assert_eq!(aggregates.country("DE").await.unwrap(), 1);
    assert_eq!(pool.running(), 2);

    pool.abort();
}

#[tokio::test]
async fn test_redelivery_overcounts_at_least_once() {
    let (broker, _store, aggregates) = setup();
    broker.publish(TOPIC, "FR", "rain|FR|Lluvioso").await.unwrap();

    // A consumer updates the store and dies before acknowledging.
    let mut crashed = broker.subscribe(TOPIC, GROUP).await.unwrap();
    let delivery = crashed.next().await.unwrap();
    aggregates.record("FR").await.unwrap();
    drop(crashed);

    assert_eq!(broker.requeue_expired(Duration::ZERO), 1);

    let pool = ConsumerPool::new(
        options(1, AckMode::AfterStore),
        Arc::new(broker.clone()),
        aggregates.clone(),
    )
    .start()
    .await
    .unwrap();

    // One distinct event, counted twice: at-least-once, not exactly-once.
    assert_eq!(wait_for_total(&aggregates, 2).await, 2);
    assert_eq!(aggregates.country("FR").await.unwrap(), 2);
    assert!(!delivery.redelivered);

    pool.abort();
}

#[tokio::test]
async fn test_pool_fails_to_start_on_unreachable_broker() {
    let (broker, _store, aggregates) = setup();
    broker.set_online(false);

    let result = ConsumerPool::new(
        options(3, AckMode::AfterStore),
        Arc::new(broker.clone()),
        aggregates,
    )
    .start()
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_workers_stop_when_broker_closes() {
    let (broker, _store, aggregates) = setup();
    let pool = ConsumerPool::new(
        options(3, AckMode::OnReceive),
        Arc::new(broker.clone()),
        aggregates,
    )
    .start()
    .await
    .unwrap();

    broker.close();
    tokio::time::timeout(Duration::from_secs(1), pool.join())
        .await
        .expect("workers should stop once the broker closes");
}
