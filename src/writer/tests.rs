use super::{Publisher, Writer};
use crate::broker::{Ack, BrokerKind, BrokerTransport, MemoryBroker, Subscription};
use crate::event::{Codec, Weather, WeatherEvent};
use crate::utils::error::{PublishError, TransportError};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Accepts publishes but never answers.
struct StalledTransport;

#[async_trait]
impl BrokerTransport for StalledTransport {
    async fn publish(&self, _: &str, _: &str, _: &str) -> Result<Ack, TransportError> {
        std::future::pending().await
    }

    async fn subscribe(&self, _: &str, _: &str) -> Result<Box<dyn Subscription>, TransportError> {
        Err(TransportError::Closed)
    }
}

fn event() -> WeatherEvent {
    WeatherEvent::new("rain", "FR", Weather::Lluvioso)
}

fn soon() -> Instant {
    Instant::now() + Duration::from_secs(1)
}

#[tokio::test]
async fn test_writer_publishes_with_bound_codec() {
    let broker = MemoryBroker::new(BrokerKind::Kafka, "memory://kafka");
    let mut subscription = broker.subscribe("message", "readers").await.unwrap();
    let writer = Writer::new(BrokerKind::Kafka, Codec::KeyValue, "message", Arc::new(broker));

    let ack = writer.publish(&event(), soon()).await.unwrap();
    assert!(!ack.message_id.is_empty());
    assert_eq!(writer.broker(), BrokerKind::Kafka);

    let delivery = subscription.next().await.unwrap();
    assert_eq!(delivery.payload, "description=rain, country=FR, weather=Lluvioso");
}

#[tokio::test]
async fn test_writer_reports_unreachable_broker() {
    let broker = MemoryBroker::new(BrokerKind::RabbitMq, "memory://rabbitmq");
    broker.set_online(false);
    let writer = Writer::new(BrokerKind::RabbitMq, Codec::Delimited, "message", Arc::new(broker));

    let err = writer.publish(&event(), soon()).await.unwrap_err();
    assert_eq!(
        err,
        PublishError::Transport {
            broker: BrokerKind::RabbitMq,
            source: TransportError::Unreachable("memory://rabbitmq".to_string()),
        }
    );
}

#[tokio::test]
async fn test_writer_times_out_at_deadline() {
    let writer = Writer::new(
        BrokerKind::Kafka,
        Codec::KeyValue,
        "message",
        Arc::new(StalledTransport),
    );

    let deadline = Instant::now() + Duration::from_millis(20);
    let err = writer.publish(&event(), deadline).await.unwrap_err();
    assert_eq!(err, PublishError::Timeout { broker: BrokerKind::Kafka });
    assert_eq!(err.broker(), BrokerKind::Kafka);
}
