//! # climate-fanout
//!
//! `climate-fanout` ingests weather reports, publishes each one to two
//! independent brokers (a Kafka-style log and a RabbitMQ-style queue) and runs
//! a pool of consumers per broker that keeps per-country counters in a shared
//! aggregate store.
//!
//! ## Core Modules
//!
//! - `event`: the weather event, its validation and the two wire codecs.
//! - `broker`: the transport seam to a broker plus the in-process `MemoryBroker`.
//! - `writer`: publishes one event to one broker under a deadline.
//! - `gateway`: validates a submission and fans it out to both writers.
//! - `consumer`: worker pools that decode deliveries and update the counters.
//! - `persistence`: the aggregate store and its memory, sled and Redis backends.
//! - `transport`: the WebSocket ingestion endpoint.
//! - `config`: file and environment configuration.
//! - `utils`: errors, logging and connection retry.

pub mod broker;
pub mod config;
pub mod consumer;
pub mod event;
pub mod gateway;
pub mod persistence;
pub mod transport;
pub mod utils;
pub mod writer;
