use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::broker::{BrokerKind, Delivery, Subscription};
use crate::consumer::AckMode;
use crate::event::Codec;
use crate::persistence::Aggregates;

/// What happened to a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Aggregated,
    Malformed,
    StoreFailed,
}

/// A single consumer. Owns its subscription; nothing is shared with the
/// other workers of the pool.
pub struct Worker {
    pub(crate) index: usize,
    pub(crate) kind: BrokerKind,
    pub(crate) codec: Codec,
    pub(crate) ack_mode: AckMode,
    pub(crate) nack_delay: Duration,
    pub(crate) subscription: Box<dyn Subscription>,
    pub(crate) aggregates: Aggregates,
}

impl Worker {
    /// Processes deliveries until the subscription closes.
    pub async fn run(mut self) {
        info!(broker = %self.kind, worker = self.index, "worker started");

        while let Some(delivery) = self.subscription.next().await {
            self.handle(delivery).await;
        }

        info!(broker = %self.kind, worker = self.index, "subscription closed, worker stopping");
    }

    pub async fn handle(&mut self, delivery: Delivery) -> Outcome {
        if self.ack_mode == AckMode::OnReceive {
            self.ack(&delivery).await;
        }

        let event = match self.codec.decode(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    broker = %self.kind,
                    worker = self.index,
                    error = %e,
                    payload = %truncate(&delivery.payload),
                    "dropping malformed message"
                );
                if self.ack_mode == AckMode::AfterStore {
                    self.ack(&delivery).await;
                }
                return Outcome::Malformed;
            }
        };

        match self.aggregates.apply(&event).await {
            Ok(()) => {
                debug!(
                    broker = %self.kind,
                    worker = self.index,
                    country = %event.country,
                    redelivered = delivery.redelivered,
                    "aggregated"
                );
                if self.ack_mode == AckMode::AfterStore {
                    self.ack(&delivery).await;
                }
                Outcome::Aggregated
            }
            Err(e) => {
                error!(
                    broker = %self.kind,
                    worker = self.index,
                    country = %event.country,
                    error = %e,
                    "failed to update aggregates"
                );
                if self.ack_mode == AckMode::AfterStore {
                    tokio::time::sleep(self.nack_delay).await;
                    if let Err(e) = self.subscription.nack(&delivery).await {
                        warn!(broker = %self.kind, worker = self.index, error = %e, "nack failed");
                    }
                }
                Outcome::StoreFailed
            }
        }
    }

    async fn ack(&mut self, delivery: &Delivery) {
        if let Err(e) = self.subscription.ack(delivery).await {
            warn!(broker = %self.kind, worker = self.index, error = %e, "ack failed");
        }
    }
}

fn truncate(payload: &str) -> String {
    payload.chars().take(100).collect()
}
