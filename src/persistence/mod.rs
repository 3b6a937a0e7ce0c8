//! The `persistence` module provides the aggregate store the consumer pools
//! write their counters into.
//!
//! `AggregateStore` exposes the atomic primitives the pipeline relies on,
//! `incr`, `hincr` and the all-or-nothing `incr_all`, plus reads for
//! reporting. Concurrent increments are serialized by the store itself; no
//! caller-side locking is involved.
//!
//! Backends:
//! - `memory::MemoryStore`: in-process, for tests and single-process runs
//! - `sled_store::SledStore`: embedded `sled` database
//! - `redis_store::RedisStore`: Redis (or Valkey) via a `ConnectionManager`

pub mod memory;
pub mod redis_store;
pub mod sled_store;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::{StoreBackend, StoreSettings};
use crate::event::WeatherEvent;
use crate::utils::error::{ConnectError, StoreError};
use crate::utils::retry::{RetryPolicy, connect_with_retry};

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use sled_store::SledStore;

/// Hash of country code to event count.
pub const COUNTRY_COUNTS: &str = "country_counts";
/// Cumulative count of aggregated events.
pub const TOTAL_MESSAGES: &str = "total_messages";
/// Field used when `total_messages` is kept as a one-field hash.
pub const TOTAL_FIELD: &str = "count";
/// Prefix of the per-event record hashes.
pub const EVENT_PREFIX: &str = "weather_tweet";

/// Where a counter lives: a plain key or one field of a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter<'a> {
    Key(&'a str),
    Field { hash: &'a str, field: &'a str },
}

#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Atomically adds `delta` to a scalar counter and returns the new value.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Atomically adds `delta` to one field of a hash and returns the new value.
    async fn hincr(&self, hash: &str, field: &str, delta: i64) -> Result<i64, StoreError>;

    /// Adds `delta` to every counter in one step. On error none of them
    /// has changed.
    async fn incr_all(&self, counters: &[Counter<'_>], delta: i64) -> Result<(), StoreError>;

    /// Sets text fields of a hash, replacing values already there.
    async fn hset_all(&self, hash: &str, fields: &[(&str, &str)]) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    async fn hget(&self, hash: &str, field: &str) -> Result<Option<i64>, StoreError>;

    async fn hgetall(&self, hash: &str) -> Result<HashMap<String, i64>, StoreError>;

    /// Reads a hash written with `hset_all`.
    async fn hgetall_text(&self, hash: &str) -> Result<HashMap<String, String>, StoreError>;
}

/// Opens the configured backend. Sled and Redis go through
/// `connect_with_retry` with `policy`.
pub async fn connect_store(
    settings: &StoreSettings,
    policy: &RetryPolicy,
) -> Result<Arc<dyn AggregateStore>, ConnectError> {
    let endpoint = settings.endpoint.as_str();
    let store: Arc<dyn AggregateStore> = match settings.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sled => Arc::new(
            connect_with_retry("sled", move || async move { SledStore::open(endpoint) }, policy)
                .await?,
        ),
        StoreBackend::Redis => Arc::new(
            connect_with_retry("redis", move || RedisStore::connect(endpoint), policy).await?,
        ),
    };
    Ok(store)
}

/// How `total_messages` is laid out in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalLayout {
    /// A plain integer key.
    #[default]
    Scalar,
    /// A hash with the single field `count`.
    Hash,
}

/// The counters maintained by the consumer pools, on top of any store.
#[derive(Clone)]
pub struct Aggregates {
    store: Arc<dyn AggregateStore>,
    layout: TotalLayout,
    record_events: bool,
}

impl Aggregates {
    pub fn new(store: Arc<dyn AggregateStore>, layout: TotalLayout) -> Self {
        Self {
            store,
            layout,
            record_events: false,
        }
    }

    /// Also keep every applied event as a `weather_tweet:*` hash.
    pub fn with_event_records(mut self, enabled: bool) -> Self {
        self.record_events = enabled;
        self
    }

    /// Stores the event record (when enabled), then counts the event.
    ///
    /// A redelivered event gets a second record; counts and records are both
    /// at-least-once.
    pub async fn apply(&self, event: &WeatherEvent) -> Result<(), StoreError> {
        if self.record_events {
            self.store_event(event).await?;
        }
        self.record(&event.country).await
    }

    /// Writes `event` as `weather_tweet:<unix-nanos>:<uuid>` with the fields
    /// `Description`, `Country` and `Weather`. Returns the hash name.
    pub async fn store_event(&self, event: &WeatherEvent) -> Result<String, StoreError> {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let key = format!("{EVENT_PREFIX}:{nanos}:{}", Uuid::new_v4());

        self.store
            .hset_all(
                &key,
                &[
                    ("Description", event.description.as_str()),
                    ("Country", event.country.as_str()),
                    ("Weather", event.weather.as_str()),
                ],
            )
            .await?;
        debug!(%key, "event recorded");
        Ok(key)
    }

    /// Counts one event for `country`: `country_counts[country]` and
    /// `total_messages` move together in a single `incr_all`.
    pub async fn record(&self, country: &str) -> Result<(), StoreError> {
        let total = match self.layout {
            TotalLayout::Scalar => Counter::Key(TOTAL_MESSAGES),
            TotalLayout::Hash => Counter::Field {
                hash: TOTAL_MESSAGES,
                field: TOTAL_FIELD,
            },
        };
        let by_country = Counter::Field {
            hash: COUNTRY_COUNTS,
            field: country,
        };
        self.store.incr_all(&[by_country, total], 1).await
    }

    pub async fn total(&self) -> Result<i64, StoreError> {
        let total = match self.layout {
            TotalLayout::Scalar => self.store.get(TOTAL_MESSAGES).await?,
            TotalLayout::Hash => self.store.hget(TOTAL_MESSAGES, TOTAL_FIELD).await?,
        };
        Ok(total.unwrap_or(0))
    }

    pub async fn country(&self, country: &str) -> Result<i64, StoreError> {
        Ok(self.store.hget(COUNTRY_COUNTS, country).await?.unwrap_or(0))
    }

    pub async fn country_counts(&self) -> Result<HashMap<String, i64>, StoreError> {
        self.store.hgetall(COUNTRY_COUNTS).await
    }
}

/// `current + delta`, or `Overflow` naming `key`.
pub(crate) fn add(key: &str, current: i64, delta: i64) -> Result<i64, StoreError> {
    current
        .checked_add(delta)
        .ok_or_else(|| StoreError::Overflow(key.to_string()))
}

impl std::fmt::Debug for Aggregates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregates")
            .field("layout", &self.layout)
            .field("record_events", &self.record_events)
            .finish()
    }
}
