//! The `event` module holds the weather event data model and the two wire
//! encodings used on the broker paths.
//!
//! - `weather`: `Weather`, `WeatherEvent`, and the unvalidated inbound
//!   `SubmitWeatherEvent`.
//! - `codec`: `Codec::Delimited` (`a|b|c`) and `Codec::KeyValue`
//!   (`description=a, country=b, weather=c`).

pub mod codec;
pub mod weather;

pub use codec::Codec;
pub use weather::{SubmitWeatherEvent, Weather, WeatherEvent};

#[cfg(test)]
mod tests;
