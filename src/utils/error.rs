//! The `error` module defines the error taxonomy shared by every component.
//!
//! Each concern gets its own enum so callers can tell "fix your input"
//! (`ValidationError`) apart from "retry later" (`PublishError`) and from
//! failures that never leave a worker (`MalformedMessage`, `StoreError`).

use thiserror::Error;

use crate::broker::BrokerKind;

/// Client-caused rejection of an inbound event. Not retryable as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid weather category '{0}', must be one of: Lluvioso, Nublado, Soleado")]
    UnknownWeather(String),
    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),
    #[error("field '{field}' must not contain '{separator}'")]
    ReservedSeparator {
        field: &'static str,
        separator: &'static str,
    },
}

/// A payload that does not decode into the three-field event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedMessage {
    #[error("expected 3 fields, found {0}")]
    FieldCount(usize),
    #[error("'{0}' is not a key=value pair")]
    NotKeyValue(String),
    #[error("unknown key '{0}'")]
    UnknownKey(String),
    #[error("duplicate key '{0}'")]
    DuplicateKey(String),
    #[error("missing key '{0}'")]
    MissingKey(&'static str),
    #[error("field '{0}' is empty")]
    EmptyField(&'static str),
    #[error("unknown weather category '{0}'")]
    UnknownWeather(String),
}

/// Errors raised by a broker transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("broker at {0} is unreachable")]
    Unreachable(String),
    #[error("broker connection closed")]
    Closed,
    #[error("broker rejected the message: {0}")]
    Rejected(String),
    #[error("unknown delivery '{0}'")]
    UnknownDelivery(String),
}

/// A failed publish on one broker branch. Retryable by resubmitting the event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("{broker}: publish timed out")]
    Timeout { broker: BrokerKind },
    #[error("{broker}: {source}")]
    Transport {
        broker: BrokerKind,
        #[source]
        source: TransportError,
    },
}

impl PublishError {
    pub fn broker(&self) -> BrokerKind {
        match self {
            PublishError::Timeout { broker } | PublishError::Transport { broker, .. } => *broker,
        }
    }
}

/// Outcome of a rejected or partially failed submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("rejected: {0}")]
    Rejected(#[from] ValidationError),
    #[error("publish failed on {}", broker_list(.failures))]
    Publish { failures: Vec<PublishError> },
}

impl GatewayError {
    /// Publish failures can be retried by resubmitting the whole event;
    /// validation failures cannot.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Publish { .. })
    }

    pub fn failed_brokers(&self) -> Vec<BrokerKind> {
        match self {
            GatewayError::Rejected(_) => Vec::new(),
            GatewayError::Publish { failures } => failures.iter().map(PublishError::broker).collect(),
        }
    }
}

fn broker_list(failures: &[PublishError]) -> String {
    failures
        .iter()
        .map(|failure| failure.broker().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by an aggregate store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    #[error("counter at '{0}' is not a 64-bit integer")]
    Corrupt(String),
    #[error("counter at '{0}' would overflow")]
    Overflow(String),
    #[error("store is unavailable")]
    Unavailable,
}

/// Terminal failure of `connect_with_retry` once every attempt is spent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not connect to {target} after {attempts} attempts: {last_error}")]
pub struct ConnectError {
    pub target: String,
    pub attempts: u32,
    pub last_error: String,
}
