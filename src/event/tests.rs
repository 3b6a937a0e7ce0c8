use super::{Codec, SubmitWeatherEvent, Weather, WeatherEvent};
use crate::utils::error::{MalformedMessage, ValidationError};

fn sample_events() -> Vec<WeatherEvent> {
    vec![
        WeatherEvent::new("rain", "FR", Weather::Lluvioso),
        WeatherEvent::new("Está lloviendo", "GT", Weather::Lluvioso),
        WeatherEvent::new("Cielo despejado", "US", Weather::Soleado),
        WeatherEvent::new("a=b with equals", "MX", Weather::Nublado),
    ]
}

#[test]
fn test_weather_parse_is_exact() {
    assert_eq!("Nublado".parse::<Weather>(), Ok(Weather::Nublado));
    assert_eq!(
        "nublado".parse::<Weather>(),
        Err(ValidationError::UnknownWeather("nublado".to_string()))
    );
}

#[test]
fn test_delimited_encoding() {
    let event = WeatherEvent::new("rain", "FR", Weather::Lluvioso);
    assert_eq!(Codec::Delimited.encode(&event), "rain|FR|Lluvioso");
}

#[test]
fn test_key_value_encoding() {
    let event = WeatherEvent::new("rain", "FR", Weather::Lluvioso);
    assert_eq!(
        Codec::KeyValue.encode(&event),
        "description=rain, country=FR, weather=Lluvioso"
    );
}

#[test]
fn test_round_trip_per_codec() {
    for codec in [Codec::Delimited, Codec::KeyValue] {
        for event in sample_events() {
            let payload = codec.encode(&event);
            assert_eq!(codec.decode(&payload), Ok(event), "codec {codec:?}");
        }
    }
}

#[test]
fn test_key_value_accepts_capitalized_keys_in_any_order() {
    let decoded = Codec::KeyValue
        .decode("Weather=Soleado, Country=GT, Description=Cielo despejado")
        .unwrap();
    assert_eq!(decoded, WeatherEvent::new("Cielo despejado", "GT", Weather::Soleado));
}

#[test]
fn test_payload_without_separators_is_malformed() {
    assert_eq!(
        Codec::Delimited.decode("bad-payload-no-separators"),
        Err(MalformedMessage::FieldCount(1))
    );
    assert_eq!(
        Codec::KeyValue.decode("bad-payload-no-separators"),
        Err(MalformedMessage::FieldCount(1))
    );
}

#[test]
fn test_delimited_wrong_field_count() {
    assert_eq!(
        Codec::Delimited.decode("rain|FR"),
        Err(MalformedMessage::FieldCount(2))
    );
    assert_eq!(
        Codec::Delimited.decode("rain|FR|Lluvioso|extra"),
        Err(MalformedMessage::FieldCount(4))
    );
}

#[test]
fn test_codecs_do_not_read_each_other() {
    let event = WeatherEvent::new("rain", "FR", Weather::Lluvioso);
    assert!(Codec::Delimited.decode(&Codec::KeyValue.encode(&event)).is_err());
    assert!(Codec::KeyValue.decode(&Codec::Delimited.encode(&event)).is_err());
}

#[test]
fn test_key_value_rejects_bad_pairs() {
    assert_eq!(
        Codec::KeyValue.decode("description=a, country, weather=Soleado"),
        Err(MalformedMessage::NotKeyValue("country".to_string()))
    );
    assert_eq!(
        Codec::KeyValue.decode("description=a, city=GT, weather=Soleado"),
        Err(MalformedMessage::UnknownKey("city".to_string()))
    );
    assert_eq!(
        Codec::KeyValue.decode("description=a, Description=b, weather=Soleado"),
        Err(MalformedMessage::DuplicateKey("Description".to_string()))
    );
}

#[test]
fn test_decode_rejects_empty_fields_and_unknown_weather() {
    assert_eq!(
        Codec::Delimited.decode("rain||Lluvioso"),
        Err(MalformedMessage::EmptyField("country"))
    );
    assert_eq!(
        Codec::Delimited.decode("fog|DE|Foggy"),
        Err(MalformedMessage::UnknownWeather("Foggy".to_string()))
    );
}

#[test]
fn test_validate_accepts_known_weather() {
    let event = SubmitWeatherEvent::new("rain", "FR", "Lluvioso").validate();
    assert_eq!(event, Ok(WeatherEvent::new("rain", "FR", Weather::Lluvioso)));
}

#[test]
fn test_validate_rejects_unknown_weather() {
    let err = SubmitWeatherEvent::new("x", "DE", "Foggy").validate().unwrap_err();
    assert_eq!(err, ValidationError::UnknownWeather("Foggy".to_string()));
}

#[test]
fn test_validate_rejects_empty_and_reserved_fields() {
    assert_eq!(
        SubmitWeatherEvent::new("", "DE", "Soleado").validate(),
        Err(ValidationError::EmptyField("description"))
    );
    assert_eq!(
        SubmitWeatherEvent::new("sun|shine", "DE", "Soleado").validate(),
        Err(ValidationError::ReservedSeparator {
            field: "description",
            separator: "|",
        })
    );
    assert_eq!(
        SubmitWeatherEvent::new("sun", "DE, AT", "Soleado").validate(),
        Err(ValidationError::ReservedSeparator {
            field: "country",
            separator: ", ",
        })
    );
}
