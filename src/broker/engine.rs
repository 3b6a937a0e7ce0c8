//! In-process broker engine.
//!
//! `MemoryBroker` stands in for a real Kafka or RabbitMQ deployment. It keeps
//! the delivery semantics the pipeline depends on:
//! - one queue per (topic, consumer group); subscriptions in a group compete
//! - every delivery is tracked until it is acked; a nack or an ack timeout
//!   puts the message back on the group's queue (at-least-once)
//! - the broker can be taken offline to simulate an unreachable endpoint

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::message::{Ack, Delivery, Message};
use crate::broker::topic::{GroupReceiver, Topic};
use crate::broker::{BrokerKind, BrokerTransport, Subscription};
use crate::utils::error::TransportError;

#[derive(Debug, Clone)]
struct PendingMessage {
    message: Message,
    group: String,
    sent_at: i64,
}

#[derive(Debug, Default)]
struct Engine {
    topics: HashMap<String, Topic>,
    pending_acks: HashMap<String, PendingMessage>,
    max_payload_bytes: Option<usize>,
    max_deliveries: Option<u32>,
    closed: bool,
}

impl Engine {
    /// Puts a pending message back on its group's queue. Messages that have
    /// used up `max_deliveries` are dropped instead.
    fn requeue(&mut self, pending: PendingMessage) -> bool {
        if let Some(max) = self.max_deliveries {
            if pending.message.delivery_count >= max {
                warn!(
                    message_id = %pending.message.message_id,
                    deliveries = pending.message.delivery_count,
                    "dropping message after max deliveries"
                );
                return false;
            }
        }

        self.topics
            .get(&pending.message.topic)
            .and_then(|topic| topic.groups.get(&pending.group))
            .map(|group| group.enqueue(pending.message))
            .unwrap_or(false)
    }
}

/// Represents an in-memory broker shared by writers and consumer pools.
///
/// Cloning is cheap; clones share the same topics and pending deliveries.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    kind: BrokerKind,
    endpoint: String,
    inner: Arc<Mutex<Engine>>,
    online: Arc<AtomicBool>,
}

impl MemoryBroker {
    pub fn new(kind: BrokerKind, endpoint: &str) -> Self {
        Self {
            kind,
            endpoint: endpoint.to_string(),
            inner: Arc::new(Mutex::new(Engine::default())),
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Payloads larger than `bytes` are rejected at publish time.
    pub fn with_max_payload(self, bytes: usize) -> Self {
        self.lock().max_payload_bytes = Some(bytes);
        self
    }

    /// A message handed out `count` times is not requeued again.
    pub fn with_max_deliveries(self, count: u32) -> Self {
        self.lock().max_deliveries = Some(count);
        self
    }

    pub fn kind(&self) -> BrokerKind {
        self.kind
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Dial function for `connect_with_retry`: yields a handle while the
    /// broker is reachable.
    pub async fn connect(&self) -> Result<MemoryBroker, TransportError> {
        self.ensure_reachable()?;
        Ok(self.clone())
    }

    /// Number of deliveries handed out and not yet settled.
    pub fn pending_count(&self) -> usize {
        self.lock().pending_acks.len()
    }

    /// Number of messages held for a topic that has no consumer group yet.
    pub fn backlog_len(&self, topic: &str) -> usize {
        self.lock()
            .topics
            .get(topic)
            .map(|topic| topic.backlog.len())
            .unwrap_or(0)
    }

    /// Requeues every delivery that has not been settled within `ack_timeout`.
    pub fn requeue_expired(&self, ack_timeout: Duration) -> usize {
        let now = chrono::Utc::now().timestamp_millis();
        let timeout_ms = i64::try_from(ack_timeout.as_millis()).unwrap_or(i64::MAX);

        let mut engine = self.lock();
        let expired: Vec<String> = engine
            .pending_acks
            .iter()
            .filter(|(_, pending)| now - pending.sent_at >= timeout_ms)
            .map(|(delivery_id, _)| delivery_id.clone())
            .collect();

        let mut requeued = 0;
        for delivery_id in expired {
            if let Some(pending) = engine.pending_acks.remove(&delivery_id) {
                if engine.requeue(pending) {
                    requeued += 1;
                }
            }
        }
        requeued
    }

    /// Periodically requeues unacknowledged deliveries until the broker closes.
    pub async fn start_redelivery_loop(self, interval: Duration, ack_timeout: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if self.lock().closed {
                break;
            }

            let requeued = self.requeue_expired(ack_timeout);
            if requeued > 0 {
                info!(broker = %self.kind, requeued, "requeued unacknowledged deliveries");
            }
        }
    }

    /// Stops accepting publishes and subscriptions. Existing subscriptions
    /// drain what is already queued and then end.
    pub fn close(&self) {
        let mut engine = self.lock();
        engine.closed = true;
        engine.topics.clear();
        info!(broker = %self.kind, "broker closed");
    }

    fn lock(&self) -> MutexGuard<'_, Engine> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_reachable(&self) -> Result<(), TransportError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable(self.endpoint.clone()));
        }
        if self.lock().closed {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn track(&self, delivery_id: &str, group: &str, message: Message) {
        self.lock().pending_acks.insert(
            delivery_id.to_string(),
            PendingMessage {
                message,
                group: group.to_string(),
                sent_at: chrono::Utc::now().timestamp_millis(),
            },
        );
    }

    fn settle(&self, delivery_id: &str, requeue: bool) -> Result<(), TransportError> {
        let mut engine = self.lock();
        let pending = engine
            .pending_acks
            .remove(delivery_id)
            .ok_or_else(|| TransportError::UnknownDelivery(delivery_id.to_string()))?;

        if requeue && !engine.requeue(pending) && engine.closed {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerTransport for MemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<Ack, TransportError> {
        self.ensure_reachable()?;

        let mut engine = self.lock();
        if let Some(max) = engine.max_payload_bytes {
            if payload.len() > max {
                return Err(TransportError::Rejected(format!(
                    "payload of {} bytes exceeds limit of {max}",
                    payload.len()
                )));
            }
        }

        let message = Message {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            message_id: Uuid::new_v4().to_string(),
            delivery_count: 0,
        };
        let message_id = message.message_id.clone();

        engine
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .route(message);

        debug!(broker = %self.kind, topic, key, %message_id, "message accepted");
        Ok(Ack { message_id })
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Box<dyn Subscription>, TransportError> {
        self.ensure_reachable()?;

        let receiver = self
            .lock()
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .join(group);

        debug!(broker = %self.kind, topic, group, "subscription opened");
        Ok(Box::new(MemorySubscription {
            broker: self.clone(),
            group: group.to_string(),
            receiver,
        }))
    }
}

/// One consumer's handle onto a (topic, group) queue.
struct MemorySubscription {
    broker: MemoryBroker,
    group: String,
    receiver: GroupReceiver,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Option<Delivery> {
        let mut message = {
            let mut receiver = self.receiver.lock().await;
            receiver.recv().await?
        };
        message.delivery_count += 1;

        let delivery = Delivery {
            delivery_id: Uuid::new_v4().to_string(),
            payload: message.payload.clone(),
            redelivered: message.delivery_count > 1,
        };
        self.broker.track(&delivery.delivery_id, &self.group, message);
        Some(delivery)
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), TransportError> {
        self.broker.settle(&delivery.delivery_id, false)
    }

    async fn nack(&mut self, delivery: &Delivery) -> Result<(), TransportError> {
        self.broker.settle(&delivery.delivery_id, true)
    }
}
