//! Wire encodings for `WeatherEvent`.
//!
//! Two encodings exist for the same logical event and each broker path is
//! bound to one of them through configuration:
//!
//! - `Delimited`: `description|country|weather`
//! - `KeyValue`: `description=…, country=…, weather=…`
//!
//! Decoding a payload that does not yield exactly the three fields fails with
//! `MalformedMessage`; consumers drop such payloads.

use serde::{Deserialize, Serialize};

use crate::event::weather::{Weather, WeatherEvent};
use crate::utils::error::MalformedMessage;

pub const FIELD_SEPARATOR: &str = "|";
pub const PAIR_SEPARATOR: &str = ", ";

/// Substrings an event field may not contain, otherwise it would not decode.
pub const RESERVED_SEPARATORS: [&str; 2] = [FIELD_SEPARATOR, PAIR_SEPARATOR];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    Delimited,
    KeyValue,
}

impl Codec {
    pub fn encode(self, event: &WeatherEvent) -> String {
        match self {
            Codec::Delimited => [
                event.description.as_str(),
                event.country.as_str(),
                event.weather.as_str(),
            ]
            .join(FIELD_SEPARATOR),
            Codec::KeyValue => format!(
                "description={}{PAIR_SEPARATOR}country={}{PAIR_SEPARATOR}weather={}",
                event.description, event.country, event.weather
            ),
        }
    }

    pub fn decode(self, payload: &str) -> Result<WeatherEvent, MalformedMessage> {
        let (description, country, weather) = match self {
            Codec::Delimited => split_delimited(payload)?,
            Codec::KeyValue => split_key_value(payload)?,
        };

        let fields = [
            ("description", description),
            ("country", country),
            ("weather", weather),
        ];
        for (field, value) in fields {
            if value.is_empty() {
                return Err(MalformedMessage::EmptyField(field));
            }
        }

        let weather: Weather = weather
            .parse()
            .map_err(|_| MalformedMessage::UnknownWeather(weather.to_string()))?;

        Ok(WeatherEvent {
            description: description.to_string(),
            country: country.to_string(),
            weather,
        })
    }
}

fn split_delimited(payload: &str) -> Result<(&str, &str, &str), MalformedMessage> {
    let parts: Vec<&str> = payload.split(FIELD_SEPARATOR).collect();
    match parts.as_slice() {
        [description, country, weather] => Ok((*description, *country, *weather)),
        _ => Err(MalformedMessage::FieldCount(parts.len())),
    }
}

/// Keys match case-insensitively and may come in any order. Values keep
/// everything after the first `=`.
fn split_key_value(payload: &str) -> Result<(&str, &str, &str), MalformedMessage> {
    let pairs: Vec<&str> = payload.split(PAIR_SEPARATOR).collect();
    if pairs.len() != 3 {
        return Err(MalformedMessage::FieldCount(pairs.len()));
    }

    let mut description = None;
    let mut country = None;
    let mut weather = None;

    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| MalformedMessage::NotKeyValue(pair.to_string()))?;

        let slot = match key.to_ascii_lowercase().as_str() {
            "description" => &mut description,
            "country" => &mut country,
            "weather" => &mut weather,
            _ => return Err(MalformedMessage::UnknownKey(key.to_string())),
        };

        if slot.replace(value).is_some() {
            return Err(MalformedMessage::DuplicateKey(key.to_string()));
        }
    }

    Ok((
        description.ok_or(MalformedMessage::MissingKey("description"))?,
        country.ok_or(MalformedMessage::MissingKey("country"))?,
        weather.ok_or(MalformedMessage::MissingKey("weather"))?,
    ))
}
