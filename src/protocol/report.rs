//! Status report wire format
//!
//! A status report travels as a GeoJSON `Feature` whose `Point` geometry holds
//! `[longitude, latitude]` and whose properties carry the integer temperature.
//! Internally positions are kept as `{lat, lng}`; the axis swap happens only in
//! this module.

use super::classify::{classify, DisplayCategory};
use super::topics::TopicBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A single position fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A self-contained position + temperature reading
///
/// # Examples
/// ```
/// use geotemp_link::protocol::{Position, StatusReport, DisplayCategory};
///
/// let report = StatusReport::new(Position::new(51.05, -114.07), 31);
/// assert_eq!(report.category(), DisplayCategory::High);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub position: Position,
    pub temperature: i64,
}

impl StatusReport {
    pub fn new(position: Position, temperature: i64) -> Self {
        Self {
            position,
            temperature,
        }
    }

    /// Display category of this reading
    pub fn category(&self) -> DisplayCategory {
        classify(self.temperature)
    }
}

/// Inbound payload could not be turned into a status report or user message
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,
    #[error("payload is not well-formed JSON: {0}")]
    Malformed(String),
    #[error("missing or invalid field `{0}`")]
    InvalidField(&'static str),
}

#[derive(Serialize)]
struct FeatureWire {
    #[serde(rename = "type")]
    kind: &'static str,
    geometry: PointWire,
    properties: PropertiesWire,
}

#[derive(Serialize)]
struct PointWire {
    #[serde(rename = "type")]
    kind: &'static str,
    coordinates: [f64; 2],
}

#[derive(Serialize)]
struct PropertiesWire {
    temp: i64,
}

/// Encode a status report into its canonical GeoJSON payload
pub fn encode_status_report(position: Position, temperature: i64) -> String {
    let feature = FeatureWire {
        kind: "Feature",
        geometry: PointWire {
            kind: "Point",
            coordinates: [position.longitude, position.latitude],
        },
        properties: PropertiesWire { temp: temperature },
    };

    // Plain structs of numbers and static strings; serde_json writes
    // non-finite floats as null rather than failing.
    serde_json::to_string(&feature).expect("status report serialization is infallible")
}

/// Decode a canonical GeoJSON payload into a status report
///
/// Only `geometry.coordinates` and `properties.temp` are required. A
/// non-integral temperature is truncated toward zero.
pub fn decode_status_report(payload: &str) -> Result<StatusReport, DecodeError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let coordinates = value
        .pointer("/geometry/coordinates")
        .and_then(Value::as_array)
        .filter(|pair| pair.len() == 2)
        .ok_or(DecodeError::InvalidField("geometry.coordinates"))?;

    let longitude = coordinates[0]
        .as_f64()
        .ok_or(DecodeError::InvalidField("geometry.coordinates"))?;
    let latitude = coordinates[1]
        .as_f64()
        .ok_or(DecodeError::InvalidField("geometry.coordinates"))?;

    let temp = value
        .pointer("/properties/temp")
        .ok_or(DecodeError::InvalidField("properties.temp"))?;
    let temperature = match temp.as_i64() {
        Some(t) => t,
        None => temp
            .as_f64()
            .map(|t| t.trunc() as i64)
            .ok_or(DecodeError::InvalidField("properties.temp"))?,
    };

    Ok(StatusReport::new(
        Position::new(latitude, longitude),
        temperature,
    ))
}

/// Decode raw transport bytes into a status report
pub fn decode_status_report_bytes(payload: &[u8]) -> Result<StatusReport, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8)?;
    decode_status_report(text)
}

/// Wrap free text as a JSON string literal
pub fn encode_user_message(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

/// Unwrap a JSON string literal produced by [`encode_user_message`]
pub fn decode_user_message(payload: &str) -> Result<String, DecodeError> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::String(text)) => Ok(text),
        Ok(_) => Err(DecodeError::InvalidField("message")),
        Err(e) => Err(DecodeError::Malformed(e.to_string())),
    }
}

/// A payload ready to be handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub destination_topic: String,
    pub payload: String,
}

impl OutgoingMessage {
    /// Status report addressed to the shared topic
    pub fn status_report(topics: &TopicBuilder, position: Position, temperature: i64) -> Self {
        Self {
            destination_topic: topics.shared_topic().to_string(),
            payload: encode_status_report(position, temperature),
        }
    }

    /// Free text addressed to `<prefix>/<segment>`
    pub fn user_message(topics: &TopicBuilder, segment: &str, text: &str) -> Self {
        Self {
            destination_topic: topics.user_topic(segment),
            payload: encode_user_message(text),
        }
    }
}
