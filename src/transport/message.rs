use serde::{Deserialize, Serialize};

use crate::broker::BrokerKind;
use crate::event::SubmitWeatherEvent;
use crate::utils::error::GatewayError;

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "submit")]
    Submit {
        description: String,
        country: String,
        weather: String,
    },
}

impl From<ClientMessage> for SubmitWeatherEvent {
    fn from(message: ClientMessage) -> Self {
        match message {
            ClientMessage::Submit {
                description,
                country,
                weather,
            } => SubmitWeatherEvent::new(description, country, weather),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Both brokers accepted the event.
    #[serde(rename = "accepted")]
    Accepted {},
    /// Validation failed; nothing was published.
    #[serde(rename = "rejected")]
    Rejected { reason: String },
    /// At least one broker failed. Brokers not listed did accept the event,
    /// so resubmitting duplicates it there.
    #[serde(rename = "partial_failure")]
    PartialFailure { brokers: Vec<BrokerKind> },
    #[serde(rename = "error")]
    Error { message: String },
}

impl From<Result<(), GatewayError>> for ServerMessage {
    fn from(result: Result<(), GatewayError>) -> Self {
        match result {
            Ok(()) => ServerMessage::Accepted {},
            Err(GatewayError::Rejected(e)) => ServerMessage::Rejected {
                reason: e.to_string(),
            },
            Err(e) => ServerMessage::PartialFailure {
                brokers: e.failed_brokers(),
            },
        }
    }
}
