use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::broker::{BrokerKind, BrokerTransport};
use crate::consumer::AckMode;
use crate::consumer::worker::Worker;
use crate::event::Codec;
use crate::persistence::Aggregates;
use crate::utils::error::TransportError;

/// Everything a pool needs to know about the broker path it consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    pub kind: BrokerKind,
    pub topic: String,
    pub group: String,
    pub workers: usize,
    pub codec: Codec,
    pub ack_mode: AckMode,
    /// Pause before returning a delivery whose store update failed.
    pub nack_delay: Duration,
}

impl PoolOptions {
    /// Defaults matching the historical deployment of `kind`: ten workers,
    /// the broker's own codec, topic `message`.
    pub fn for_broker(kind: BrokerKind) -> Self {
        Self {
            kind,
            topic: "message".to_string(),
            group: format!("{kind}-consumer-group"),
            workers: 10,
            codec: kind.default_codec(),
            ack_mode: AckMode::default(),
            nack_delay: Duration::from_secs(1),
        }
    }
}

/// A fixed-size set of independent workers consuming one broker.
pub struct ConsumerPool {
    options: PoolOptions,
    transport: Arc<dyn BrokerTransport>,
    aggregates: Aggregates,
}

impl ConsumerPool {
    pub fn new(
        options: PoolOptions,
        transport: Arc<dyn BrokerTransport>,
        aggregates: Aggregates,
    ) -> Self {
        Self {
            options,
            transport,
            aggregates,
        }
    }

    /// Opens one subscription per worker and spawns the workers.
    ///
    /// All subscriptions are opened before any worker starts, so a broker
    /// that refuses them fails the whole pool up front. A pool of zero
    /// workers is started with one.
    pub async fn start(self) -> Result<PoolHandle, TransportError> {
        let options = self.options;
        let count = options.workers.max(1);

        let mut subscriptions = Vec::with_capacity(count);
        for _ in 0..count {
            subscriptions.push(
                self.transport
                    .subscribe(&options.topic, &options.group)
                    .await?,
            );
        }

        let workers = subscriptions
            .into_iter()
            .enumerate()
            .map(|(index, subscription)| {
                let worker = Worker {
                    index,
                    kind: options.kind,
                    codec: options.codec,
                    ack_mode: options.ack_mode,
                    nack_delay: options.nack_delay,
                    subscription,
                    aggregates: self.aggregates.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            broker = %options.kind,
            topic = %options.topic,
            group = %options.group,
            workers = count,
            codec = ?options.codec,
            ack_mode = ?options.ack_mode,
            "consumer pool started"
        );

        Ok(PoolHandle {
            kind: options.kind,
            workers,
        })
    }
}

/// Handle onto the running workers of a pool.
#[derive(Debug)]
pub struct PoolHandle {
    kind: BrokerKind,
    workers: Vec<JoinHandle<()>>,
}

impl PoolHandle {
    pub fn kind(&self) -> BrokerKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Number of workers still running.
    pub fn running(&self) -> usize {
        self.workers.iter().filter(|worker| !worker.is_finished()).count()
    }

    /// Waits for every worker to stop, which happens once their
    /// subscriptions close.
    pub async fn join(self) {
        for result in futures::future::join_all(self.workers).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    warn!(broker = %self.kind, error = %e, "worker task failed");
                }
            }
        }
    }

    pub fn abort(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}
