//! Vertex build records and result snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// The outcome of building one vertex, as reported by `end_vertex` and by
/// the build snapshot endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexBuildRecord {
  #[serde(default, alias = "vertex_id")]
  pub id: String,
  #[serde(default)]
  pub valid: bool,
  /// Output payload, keyed by output slot under `outputs`.
  #[serde(default)]
  pub data: serde_json::Value,
  #[serde(default, deserialize_with = "nullable")]
  pub next_vertices_ids: Vec<String>,
  #[serde(default, deserialize_with = "nullable")]
  pub inactivated_vertices: Vec<String>,
  #[serde(default, deserialize_with = "nullable")]
  pub top_level_vertices: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub params: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timestamp: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub run_id: Option<String>,
}

impl VertexBuildRecord {
  /// Error messages the server attached to the vertex outputs.
  ///
  /// A failed vertex reports each message as
  /// `data.outputs.<slot>.message.errorMessage`.
  pub fn error_messages(&self) -> Vec<String> {
    let Some(outputs) = self.data.get("outputs").and_then(serde_json::Value::as_object) else {
      return Vec::new();
    };

    outputs
      .values()
      .filter_map(|output| output.pointer("/message/errorMessage"))
      .filter_map(serde_json::Value::as_str)
      .map(str::to_string)
      .collect()
  }
}

/// A complete set of vertex results for a flow, keyed by vertex id.
///
/// Accepts both a single record and a history list per vertex; for lists the
/// last entry is the current one. The map key always wins over the id inside
/// the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BuildSnapshot(pub BTreeMap<String, VertexBuildRecord>);

/// Body of the build snapshot endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildsResponse {
  #[serde(default)]
  pub vertex_builds: BuildSnapshot,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
  Many(Vec<VertexBuildRecord>),
  One(VertexBuildRecord),
}

impl<'de> Deserialize<'de> for BuildSnapshot {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let raw = Option::<BTreeMap<String, OneOrMany>>::deserialize(deserializer)?.unwrap_or_default();

    let records = raw
      .into_iter()
      .filter_map(|(id, entry)| {
        let mut record = match entry {
          OneOrMany::One(record) => record,
          OneOrMany::Many(history) => history.into_iter().last()?,
        };
        record.id = id.clone();
        Some((id, record))
      })
      .collect();

    Ok(Self(records))
  }
}

impl BuildSnapshot {
  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn into_inner(self) -> BTreeMap<String, VertexBuildRecord> {
    self.0
  }
}

impl FromIterator<VertexBuildRecord> for BuildSnapshot {
  fn from_iter<I: IntoIterator<Item = VertexBuildRecord>>(iter: I) -> Self {
    Self(iter.into_iter().map(|r| (r.id.clone(), r)).collect())
  }
}

fn nullable<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
