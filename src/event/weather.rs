use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::event::codec::RESERVED_SEPARATORS;
use crate::utils::error::ValidationError;

/// The closed set of weather categories accepted at the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weather {
    Lluvioso,
    Nublado,
    Soleado,
}

impl Weather {
    pub const ALL: [Weather; 3] = [Weather::Lluvioso, Weather::Nublado, Weather::Soleado];

    pub fn as_str(&self) -> &'static str {
        match self {
            Weather::Lluvioso => "Lluvioso",
            Weather::Nublado => "Nublado",
            Weather::Soleado => "Soleado",
        }
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weather {
    type Err = ValidationError;

    /// Matching is exact; `"lluvioso"` is not a known category.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Weather::ALL
            .into_iter()
            .find(|weather| weather.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownWeather(s.to_string()))
    }
}

/// A validated weather event, the unit that is published and aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherEvent {
    pub description: String,
    pub country: String,
    pub weather: Weather,
}

impl WeatherEvent {
    pub fn new(
        description: impl Into<String>,
        country: impl Into<String>,
        weather: Weather,
    ) -> Self {
        Self {
            description: description.into(),
            country: country.into(),
            weather,
        }
    }
}

/// An inbound submission as received from the producer, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitWeatherEvent {
    pub description: String,
    pub country: String,
    pub weather: String,
}

impl SubmitWeatherEvent {
    pub fn new(
        description: impl Into<String>,
        country: impl Into<String>,
        weather: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            country: country.into(),
            weather: weather.into(),
        }
    }

    /// Checks the submission and turns it into a `WeatherEvent`.
    ///
    /// Every accepted event encodes to a payload that both codecs decode back
    /// to the same event.
    pub fn validate(self) -> Result<WeatherEvent, ValidationError> {
        for (field, value) in [
            ("description", &self.description),
            ("country", &self.country),
            ("weather", &self.weather),
        ] {
            if value.is_empty() {
                return Err(ValidationError::EmptyField(field));
            }
        }

        let weather: Weather = self.weather.parse()?;

        for (field, value) in [("description", &self.description), ("country", &self.country)] {
            let reserved = RESERVED_SEPARATORS.into_iter().find(|sep| value.contains(*sep));
            if let Some(separator) = reserved {
                return Err(ValidationError::ReservedSeparator { field, separator });
            }
        }

        Ok(WeatherEvent {
            description: self.description,
            country: self.country,
            weather,
        })
    }
}
