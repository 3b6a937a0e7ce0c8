//! The `broker` module defines the contract every message-broker backend
//! offers to writers and consumer pools, plus an in-process implementation.
//!
//! - `BrokerTransport`: `publish(topic, key, payload)` and
//!   `subscribe(topic, group)`.
//! - `Subscription`: a single worker's handle onto a topic/group, yielding
//!   `Delivery` values that are settled with `ack` or `nack`.
//! - `engine::MemoryBroker`: topics, consumer groups with competing
//!   consumers, ack tracking and redelivery of unacknowledged messages.

pub mod engine;
pub mod message;
pub mod topic;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::event::Codec;
use crate::utils::error::TransportError;

pub use engine::MemoryBroker;
pub use message::{Ack, Delivery, Message};

/// The two broker backends every event is fanned out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    Kafka,
    RabbitMq,
}

impl BrokerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerKind::Kafka => "kafka",
            BrokerKind::RabbitMq => "rabbitmq",
        }
    }

    /// Encoding historically used on this broker's path.
    pub fn default_codec(&self) -> Codec {
        match self {
            BrokerKind::Kafka => Codec::KeyValue,
            BrokerKind::RabbitMq => Codec::Delimited,
        }
    }
}

impl fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Hands `payload` to the broker. `Ok` means the broker accepted it.
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<Ack, TransportError>;

    /// Opens a new subscription. Subscriptions sharing a `group` compete for
    /// messages; each message goes to one of them.
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Box<dyn Subscription>, TransportError>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next delivery. `None` once the subscription is closed.
    async fn next(&mut self) -> Option<Delivery>;

    /// Confirms a delivery; it will not be redelivered.
    async fn ack(&mut self, delivery: &Delivery) -> Result<(), TransportError>;

    /// Returns a delivery to the group so it is delivered again.
    async fn nack(&mut self, delivery: &Delivery) -> Result<(), TransportError>;
}
