//! The `consumer` module runs the worker pools that turn broker messages
//! into aggregate counters.
//!
//! Each pool starts N workers against one broker. Every worker opens its own
//! subscription and loops independently: receive, decode, record. Workers
//! share nothing in process; the store's atomic increments are the only
//! point of contention.

pub mod pool;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use pool::{ConsumerPool, PoolHandle, PoolOptions};

/// When a worker acknowledges a delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Ack as soon as the message is received. A crash before the store
    /// update loses the message (at-most-once).
    OnReceive,
    /// Ack only after both counters are updated; a failed update is nacked
    /// and redelivered (at-least-once, may overcount).
    #[default]
    AfterStore,
}

#[cfg(test)]
mod tests;
