//! Wire parsing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::event::{BuildError, BuildEvent};

/// A raw named event, as recorded from the stream.
///
/// Recorded logs store one of these per line. `data` may be the original
/// string or an already-decoded JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
  pub event: String,
  #[serde(default)]
  pub data: serde_json::Value,
}

impl WireEvent {
  pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
    Self {
      event: event.into(),
      data: serde_json::Value::String(data.into()),
    }
  }

  pub fn data_str(&self) -> String {
    match &self.data {
      serde_json::Value::String(s) => s.clone(),
      serde_json::Value::Null => String::new(),
      other => other.to_string(),
    }
  }

  pub fn parse(&self) -> Result<BuildEvent, EventError> {
    parse_event(&self.event, &self.data_str())
  }
}

/// Turn a named wire event into a [`BuildEvent`].
///
/// The `error` channel never fails to parse: whatever is not a build error is
/// classified as a transport error (see [`classify_error`]).
pub fn parse_event(name: &str, data: &str) -> Result<BuildEvent, EventError> {
  match name {
    "connected" => Ok(BuildEvent::Connected(
      serde_json::from_str(data).unwrap_or_else(|_| serde_json::Value::String(data.to_string())),
    )),
    "vertices_sorted" => payload(name, data).map(BuildEvent::VerticesSorted),
    "build_start" => payload(name, data).map(BuildEvent::BuildStart),
    "end_vertex" => payload(name, data).map(BuildEvent::EndVertex),
    "end" => payload(name, data).map(BuildEvent::End),
    "error" => Ok(classify_error(data)),
    "heartbeat" => Ok(BuildEvent::Heartbeat),
    other => Err(EventError::UnknownEvent(other.to_string())),
  }
}

/// Split the overloaded `error` channel.
///
/// A JSON object with a string `message` is a build error. Anything else,
/// including valid JSON without a message, came from the connection.
pub fn classify_error(data: &str) -> BuildEvent {
  let error = serde_json::from_str::<serde_json::Value>(data)
    .ok()
    .filter(serde_json::Value::is_object)
    .and_then(|value| serde_json::from_value::<BuildError>(value).ok());

  match error {
    Some(error) => BuildEvent::Error(error),
    None => BuildEvent::TransportError {
      reason: if data.trim().is_empty() {
        "empty error event".to_string()
      } else {
        data.to_string()
      },
    },
  }
}

fn payload<T: DeserializeOwned>(name: &str, data: &str) -> Result<T, EventError> {
  let data = if data.trim().is_empty() { "{}" } else { data };

  serde_json::from_str(data).map_err(|source| EventError::Malformed {
    event: name.to_string(),
    source,
  })
}
