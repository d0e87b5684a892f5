use flowsync_events::VerticesSorted;
use serde::{Deserialize, Serialize};

/// The plan of one build run.
///
/// Created from a `vertices_sorted` event and never modified afterwards; the
/// next run replaces it as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDescriptor {
  vertices_ids: Vec<String>,
  vertices_to_run: Vec<String>,
  vertices_layers: Vec<Vec<String>>,
  run_id: String,
}

impl RunDescriptor {
  pub fn new(
    run_id: impl Into<String>,
    vertices_ids: Vec<String>,
    vertices_to_run: Vec<String>,
    vertices_layers: Vec<Vec<String>>,
  ) -> Self {
    Self {
      vertices_ids,
      vertices_to_run,
      vertices_layers,
      run_id: run_id.into(),
    }
  }

  /// Build a descriptor from the wire event. `fallback_run_id` is used when
  /// the server did not tag the run.
  pub fn from_sorted(sorted: &VerticesSorted, fallback_run_id: impl Into<String>) -> Self {
    let run_id = sorted
      .run_id
      .clone()
      .unwrap_or_else(|| fallback_run_id.into());
    let to_run = sorted.to_run.clone().unwrap_or_else(|| sorted.ids.clone());
    let layers = sorted
      .layers
      .clone()
      .unwrap_or_else(|| vec![sorted.ids.clone()]);

    Self::new(run_id, sorted.ids.clone(), to_run, layers)
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn vertices_ids(&self) -> &[String] {
    &self.vertices_ids
  }

  pub fn vertices_to_run(&self) -> &[String] {
    &self.vertices_to_run
  }

  pub fn vertices_layers(&self) -> &[Vec<String>] {
    &self.vertices_layers
  }
}

/// Aggregate outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
  pub success: bool,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub error: Vec<String>,
}

impl BuildInfo {
  pub fn success() -> Self {
    Self {
      success: true,
      error: Vec::new(),
    }
  }

  pub fn failure(error: Vec<String>) -> Self {
    Self {
      success: false,
      error,
    }
  }
}
