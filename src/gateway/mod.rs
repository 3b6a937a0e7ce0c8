//! The `gateway` module is the ingestion entry point.
//!
//! A submission moves through `Received → Validated → Publishing → Responding`:
//! invalid events are rejected before any broker is touched, valid ones are
//! published to both writers concurrently under one shared deadline. There is
//! no rollback: if one broker accepts and the other fails, the caller gets an
//! error naming the failed broker and is expected to resubmit the event.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::event::SubmitWeatherEvent;
use crate::utils::error::{GatewayError, PublishError};
use crate::writer::Publisher;

pub struct Gateway {
    kafka: Arc<dyn Publisher>,
    rabbitmq: Arc<dyn Publisher>,
    deadline: Duration,
}

impl Gateway {
    pub fn new(
        kafka: Arc<dyn Publisher>,
        rabbitmq: Arc<dyn Publisher>,
        deadline: Duration,
    ) -> Self {
        Self {
            kafka,
            rabbitmq,
            deadline,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Validates `request` and publishes it to both brokers.
    ///
    /// Both branches always run to completion or to the deadline, even when
    /// the other one has already failed.
    pub async fn submit(&self, request: SubmitWeatherEvent) -> Result<(), GatewayError> {
        let event = request.validate().inspect_err(|e| {
            warn!(error = %e, "rejected weather event");
        })?;

        let deadline = Instant::now() + self.deadline;
        let (kafka, rabbitmq) = tokio::join!(
            self.kafka.publish(&event, deadline),
            self.rabbitmq.publish(&event, deadline),
        );

        let failures: Vec<PublishError> = [kafka, rabbitmq]
            .into_iter()
            .filter_map(Result::err)
            .collect();

        if failures.is_empty() {
            info!(country = %event.country, weather = %event.weather, "weather event published");
            return Ok(());
        }

        for failure in &failures {
            error!(broker = %failure.broker(), error = %failure, "publish failed");
        }
        Err(GatewayError::Publish { failures })
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("kafka", &self.kafka.broker())
            .field("rabbitmq", &self.rabbitmq.broker())
            .field("deadline", &self.deadline)
            .finish()
    }
}
