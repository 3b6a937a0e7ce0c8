//! Message definitions for the broker
//!
//! `Message` is what the in-memory engine stores and routes. `Delivery` is
//! the view a subscriber gets of one message: the payload plus the id used to
//! settle it. Notes on fields:
//! - `key`: partitioning key supplied by the publisher (the country code)
//! - `timestamp`: milliseconds since UNIX epoch; set by the broker on publish
//! - `delivery_count`: how many times the message was handed out

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub key: String,
    pub payload: String,
    pub timestamp: i64,
    pub message_id: String,
    pub delivery_count: u32,
}

/// Confirmation that a broker accepted a published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_id: String,
    pub payload: String,
    pub redelivered: bool,
}
