use std::collections::BTreeMap;

use serde::Serialize;

use crate::status::BuildStatus;

/// Node id -> current build status.
///
/// An open map: any id can be written, whether or not it belongs to the
/// current run. Entries are only overwritten, never removed, except by
/// [`BuildStatusRegistry::clear`] when the open flow changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BuildStatusRegistry {
  statuses: BTreeMap<String, BuildStatus>,
}

impl BuildStatusRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, id: &str) -> Option<BuildStatus> {
    self.statuses.get(id).copied()
  }

  pub fn set(&mut self, id: impl Into<String>, status: BuildStatus) {
    self.statuses.insert(id.into(), status);
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, BuildStatus)> {
    self.statuses.iter().map(|(id, s)| (id.as_str(), *s))
  }

  /// Ids currently in the given status, in id order.
  pub fn with_status(&self, status: BuildStatus) -> Vec<&str> {
    self
      .iter()
      .filter(|(_, s)| *s == status)
      .map(|(id, _)| id)
      .collect()
  }

  pub fn len(&self) -> usize {
    self.statuses.len()
  }

  pub fn is_empty(&self) -> bool {
    self.statuses.is_empty()
  }

  pub fn clear(&mut self) {
    self.statuses.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_overwrite() {
    let mut registry = BuildStatusRegistry::new();
    registry.set("A", BuildStatus::ToBuild);
    registry.set("A", BuildStatus::Built);

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get("A"), Some(BuildStatus::Built));
    assert_eq!(registry.get("B"), None);
  }

  #[test]
  fn test_with_status() {
    let mut registry = BuildStatusRegistry::new();
    registry.set("b", BuildStatus::Building);
    registry.set("a", BuildStatus::Building);
    registry.set("c", BuildStatus::Built);

    assert_eq!(registry.with_status(BuildStatus::Building), vec!["a", "b"]);
  }

  #[test]
  fn test_serializes_as_map() {
    let mut registry = BuildStatusRegistry::new();
    registry.set("A", BuildStatus::Error);

    assert_eq!(
      serde_json::to_value(&registry).unwrap(),
      serde_json::json!({ "A": "ERROR" })
    );
  }
}
