use std::collections::BTreeMap;

use flowsync_events::{BuildSnapshot, VertexBuildRecord};
use serde::Serialize;

/// Node id -> the node's most recent build record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FlowExecutionPool {
  records: BTreeMap<String, VertexBuildRecord>,
}

impl FlowExecutionPool {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, id: &str) -> Option<&VertexBuildRecord> {
    self.records.get(id)
  }

  pub fn contains(&self, id: &str) -> bool {
    self.records.contains_key(id)
  }

  pub fn insert(&mut self, id: impl Into<String>, record: VertexBuildRecord) {
    self.records.insert(id.into(), record);
  }

  pub fn remove(&mut self, id: &str) -> Option<VertexBuildRecord> {
    self.records.remove(id)
  }

  /// Replace every record with the snapshot's.
  pub fn replace(&mut self, snapshot: BuildSnapshot) {
    self.records = snapshot.into_inner();
  }

  /// Whether any record was produced by the given run.
  pub fn has_run(&self, run_id: &str) -> bool {
    self
      .records
      .values()
      .any(|r| r.run_id.as_deref() == Some(run_id))
  }

  pub fn ids(&self) -> impl Iterator<Item = &str> {
    self.records.keys().map(String::as_str)
  }

  pub fn records(&self) -> &BTreeMap<String, VertexBuildRecord> {
    &self.records
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn clear(&mut self) {
    self.records.clear();
  }
}
