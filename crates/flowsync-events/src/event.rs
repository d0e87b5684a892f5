use serde::{Deserialize, Deserializer, Serialize};

use crate::record::{BuildSnapshot, VertexBuildRecord};

/// One event of a flow build, independent of how it was delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
  /// The stream is established. The payload is informational only.
  Connected(serde_json::Value),

  /// A new run has been planned.
  VerticesSorted(VerticesSorted),

  /// A vertex has started building.
  BuildStart(BuildStart),

  /// A vertex has finished building, successfully or not.
  EndVertex(EndVertex),

  /// The whole run has finished.
  End(BuildEnd),

  /// The build failed before reaching `end`.
  Error(BuildError),

  /// Keep-alive. Carries nothing.
  Heartbeat,

  /// Something arrived on the `error` channel that is not a build error.
  TransportError { reason: String },

  /// The connection to the build server failed.
  Disconnected { reason: String },
}

impl BuildEvent {
  /// Name used in logs. Matches the wire name where there is one.
  pub fn name(&self) -> &'static str {
    match self {
      BuildEvent::Connected(_) => "connected",
      BuildEvent::VerticesSorted(_) => "vertices_sorted",
      BuildEvent::BuildStart(_) => "build_start",
      BuildEvent::EndVertex(_) => "end_vertex",
      BuildEvent::End(_) => "end",
      BuildEvent::Error(_) => "error",
      BuildEvent::Heartbeat => "heartbeat",
      BuildEvent::TransportError { .. } => "transport_error",
      BuildEvent::Disconnected { .. } => "disconnected",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerticesSorted {
  /// Every vertex taking part in the run, in execution order.
  pub ids: Vec<String>,
  /// The subset that will actually be built. Absent means all of `ids`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub to_run: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub run_id: Option<String>,
  /// Staged grouping of `ids`. Absent means a single layer.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub layers: Option<Vec<Vec<String>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStart {
  pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndVertex {
  pub build_data: VertexBuildRecord,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub run_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildEnd {
  /// The backend sends an empty payload on success.
  #[serde(default = "default_success")]
  pub success: bool,
  #[serde(default, deserialize_with = "error_messages")]
  pub error: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub vertex_builds: Option<BuildSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildError {
  pub message: String,
}

impl BuildEnd {
  pub fn success() -> Self {
    Self {
      success: true,
      error: Vec::new(),
      vertex_builds: None,
    }
  }

  pub fn failure(message: impl Into<String>) -> Self {
    Self {
      success: false,
      error: vec![message.into()],
      vertex_builds: None,
    }
  }
}

fn default_success() -> bool {
  true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorMessages {
  One(String),
  Many(Vec<String>),
}

fn error_messages<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(match Option::<ErrorMessages>::deserialize(deserializer)? {
    Some(ErrorMessages::One(message)) => vec![message],
    Some(ErrorMessages::Many(messages)) => messages,
    None => Vec::new(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_end_defaults_to_success() {
    let end: BuildEnd = serde_json::from_value(json!({})).unwrap();
    assert_eq!(end, BuildEnd::success());
  }

  #[test]
  fn test_end_error_forms() {
    let end: BuildEnd =
      serde_json::from_value(json!({ "success": false, "error": "boom" })).unwrap();
    assert_eq!(end.error, vec!["boom".to_string()]);

    let end: BuildEnd =
      serde_json::from_value(json!({ "success": false, "error": ["a", "b"] })).unwrap();
    assert_eq!(end.error.len(), 2);

    let end: BuildEnd = serde_json::from_value(json!({ "success": false, "error": null })).unwrap();
    assert!(end.error.is_empty());
  }

  #[test]
  fn test_end_with_snapshot() {
    let end: BuildEnd = serde_json::from_value(json!({
      "success": true,
      "vertex_builds": { "A": { "valid": true } }
    }))
    .unwrap();

    let snapshot = end.vertex_builds.unwrap();
    assert_eq!(snapshot.0["A"].id, "A");
  }
}
