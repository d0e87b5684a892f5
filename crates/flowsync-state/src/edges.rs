use flowsync_config::EdgeDef;
use serde::Serialize;

/// One edge of the open flow and whether it is animated as "running".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeState {
  pub id: String,
  pub source: String,
  pub target: String,
  pub animated: bool,
}

/// Edge animation state for the open flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FlowEdges {
  edges: Vec<EdgeState>,
}

impl FlowEdges {
  pub fn from_defs(defs: &[EdgeDef]) -> Self {
    let edges = defs
      .iter()
      .map(|def| EdgeState {
        id: if def.id.is_empty() {
          format!("{}->{}", def.source, def.target)
        } else {
          def.id.clone()
        },
        source: def.source.clone(),
        target: def.target.clone(),
        animated: false,
      })
      .collect();

    Self { edges }
  }

  /// Set `animated` on every edge terminating at one of `targets`.
  pub fn set_running_by_targets(&mut self, targets: &[String], running: bool) {
    for edge in &mut self.edges {
      if targets.iter().any(|t| *t == edge.target) {
        edge.animated = running;
      }
    }
  }

  pub fn clear_running(&mut self) {
    for edge in &mut self.edges {
      edge.animated = false;
    }
  }

  pub fn running(&self) -> impl Iterator<Item = &EdgeState> {
    self.edges.iter().filter(|e| e.animated)
  }

  pub fn iter(&self) -> impl Iterator<Item = &EdgeState> {
    self.edges.iter()
  }

  pub fn len(&self) -> usize {
    self.edges.len()
  }

  pub fn is_empty(&self) -> bool {
    self.edges.is_empty()
  }
}
