//! Flow definitions as exported by the editor.
//!
//! Only the parts the build subsystem needs are modelled: the flow identity
//! and the node/edge topology. Everything else in an export is ignored.
//!
//! ```json
//! {
//!   "id": "0b6c...",
//!   "name": "Basic Prompting",
//!   "endpoint_name": "basic-prompting",
//!   "data": {
//!     "nodes": [{ "id": "ChatInput-1" }, { "id": "ChatOutput-2" }],
//!     "edges": [{ "id": "e1", "source": "ChatInput-1", "target": "ChatOutput-2" }]
//!   }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDef {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub endpoint_name: Option<String>,
  #[serde(default)]
  pub data: FlowData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowData {
  #[serde(default)]
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub edges: Vec<EdgeDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDef {
  #[serde(default)]
  pub id: String,
  pub source: String,
  pub target: String,
}

impl FlowDef {
  /// A flow known only by id, with no topology.
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: String::new(),
      endpoint_name: None,
      data: FlowData::default(),
    }
  }

  pub fn with_endpoint_name(mut self, endpoint_name: impl Into<String>) -> Self {
    self.endpoint_name = Some(endpoint_name.into());
    self
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// The identifier used to address the flow's event stream: the public
  /// endpoint name when set, otherwise the internal id.
  pub fn flow_identifier(&self) -> &str {
    match self.endpoint_name.as_deref() {
      Some(name) if !name.trim().is_empty() => name,
      _ => &self.id,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_identifier_prefers_endpoint_name() {
    let flow = FlowDef::new("f-123").with_endpoint_name("my-endpoint");
    assert_eq!(flow.flow_identifier(), "my-endpoint");
  }

  #[test]
  fn test_identifier_falls_back_to_id() {
    assert_eq!(FlowDef::new("f-123").flow_identifier(), "f-123");

    let blank = FlowDef::new("f-123").with_endpoint_name("  ");
    assert_eq!(blank.flow_identifier(), "f-123");
  }

  #[test]
  fn test_parse_editor_export() {
    let flow: FlowDef = serde_json::from_value(json!({
      "id": "f-1",
      "name": "Basic Prompting",
      "description": "ignored",
      "data": {
        "nodes": [
          { "id": "ChatInput-1", "type": "genericNode", "position": { "x": 0, "y": 0 } },
          { "id": "ChatOutput-2" }
        ],
        "edges": [
          { "id": "e1", "source": "ChatInput-1", "target": "ChatOutput-2", "animated": false }
        ],
        "viewport": { "zoom": 1 }
      }
    }))
    .unwrap();

    assert_eq!(flow.endpoint_name, None);
    assert_eq!(flow.data.nodes.len(), 2);
    assert_eq!(flow.data.edges[0].target, "ChatOutput-2");
  }

  #[test]
  fn test_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flow.json");
    std::fs::write(&path, r#"{"id": "f-9", "endpoint_name": "nine"}"#).unwrap();

    let flow = FlowDef::from_file(&path).unwrap();
    assert_eq!(flow.flow_identifier(), "nine");
    assert!(flow.data.edges.is_empty());
  }
}
