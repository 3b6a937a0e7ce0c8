//! The `writer` module publishes validated events to one broker.
//!
//! A `Writer` owns the codec bound to its broker path and the topic name. It
//! makes exactly one publish attempt per call, bounded by the caller's
//! deadline; retrying is left to whoever resubmits the event.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::broker::{Ack, BrokerKind, BrokerTransport};
use crate::event::{Codec, WeatherEvent};
use crate::utils::error::PublishError;

/// Anything the gateway can fan an event out to.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn broker(&self) -> BrokerKind;

    async fn publish(&self, event: &WeatherEvent, deadline: Instant) -> Result<Ack, PublishError>;
}

pub struct Writer {
    kind: BrokerKind,
    codec: Codec,
    topic: String,
    transport: Arc<dyn BrokerTransport>,
}

impl Writer {
    pub fn new(
        kind: BrokerKind,
        codec: Codec,
        topic: &str,
        transport: Arc<dyn BrokerTransport>,
    ) -> Self {
        Self {
            kind,
            codec,
            topic: topic.to_string(),
            transport,
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }
}

#[async_trait]
impl Publisher for Writer {
    fn broker(&self) -> BrokerKind {
        self.kind
    }

    async fn publish(&self, event: &WeatherEvent, deadline: Instant) -> Result<Ack, PublishError> {
        let payload = self.codec.encode(event);
        let publish = self.transport.publish(&self.topic, &event.country, &payload);

        match tokio::time::timeout_at(deadline, publish).await {
            Err(_) => Err(PublishError::Timeout { broker: self.kind }),
            Ok(Err(source)) => Err(PublishError::Transport {
                broker: self.kind,
                source,
            }),
            Ok(Ok(ack)) => {
                debug!(
                    broker = %self.kind,
                    topic = %self.topic,
                    message_id = %ack.message_id,
                    "published"
                );
                Ok(ack)
            }
        }
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("kind", &self.kind)
            .field("codec", &self.codec)
            .field("topic", &self.topic)
            .finish()
    }
}

#[cfg(test)]
mod tests;
