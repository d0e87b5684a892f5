//! The flow state store.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use flowsync_config::FlowDef;
use flowsync_events::{BuildSnapshot, VertexBuildRecord};
use serde::Serialize;

use crate::edges::FlowEdges;
use crate::pool::FlowExecutionPool;
use crate::registry::BuildStatusRegistry;
use crate::run::{BuildInfo, RunDescriptor};
use crate::status::BuildStatus;

/// All build state of the currently open flow.
///
/// Single writer (the orchestrator), many readers. Switching flows calls
/// [`FlowState::reset`], which drops everything from the previous flow.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowState {
  flow_id: Option<String>,
  is_building: bool,
  build_info: Option<BuildInfo>,
  run: Option<RunDescriptor>,
  registry: BuildStatusRegistry,
  pool: FlowExecutionPool,
  edges: FlowEdges,
  pending: BTreeSet<String>,
  current_building: Vec<String>,
  /// Messages of the nodes that failed in the current run.
  node_errors: BTreeMap<String, Vec<String>>,
  #[serde(skip)]
  finished: HashSet<String>,
  #[serde(skip)]
  nodes: BTreeSet<String>,
}

impl FlowState {
  /// Empty state for the given flow.
  pub fn new(flow: &FlowDef) -> Self {
    let mut state = Self::default();
    state.reset(flow);
    state
  }

  /// Forget everything and start over for `flow`.
  pub fn reset(&mut self, flow: &FlowDef) {
    *self = Self {
      flow_id: Some(flow.id.clone()),
      edges: FlowEdges::from_defs(&flow.data.edges),
      nodes: flow.data.nodes.iter().map(|node| node.id.clone()).collect(),
      ..Self::default()
    };
  }

  pub fn update_build_status(&mut self, ids: &[String], status: BuildStatus) {
    for id in ids {
      self.registry.set(id.clone(), status);
      if status.is_finished() {
        self.finished.insert(id.clone());
      } else {
        self.finished.remove(id);
      }
    }
  }

  pub fn update_edges_running_by_nodes(&mut self, ids: &[String], running: bool) {
    self.edges.set_running_by_targets(ids, running);
  }

  pub fn clear_edges_running_by_nodes(&mut self) {
    self.edges.clear_running();
  }

  pub fn add_data_to_flow_pool(&mut self, record: VertexBuildRecord, id: &str) {
    self.pool.insert(id, record);
  }

  pub fn remove_from_flow_pool(&mut self, ids: &[String]) {
    for id in ids {
      self.pool.remove(id);
    }
  }

  pub fn replace_flow_pool(&mut self, snapshot: BuildSnapshot) {
    self.pool.replace(snapshot);
  }

  pub fn set_is_building(&mut self, is_building: bool) {
    self.is_building = is_building;
  }

  pub fn set_build_info(&mut self, info: Option<BuildInfo>) {
    self.build_info = info;
  }

  /// Install a new run. Progress tracking starts over.
  pub fn update_vertices_build(&mut self, run: RunDescriptor) {
    self.pending = run.vertices_to_run().iter().cloned().collect();
    self.finished.clear();
    self.run = Some(run);
  }

  pub fn remove_from_vertices_build(&mut self, ids: &[String]) {
    for id in ids {
      self.pending.remove(id);
    }
  }

  pub fn set_current_building_node_id(&mut self, ids: Vec<String>) {
    self.current_building = ids;
  }

  /// Record why `id` failed. An empty list forgets the node.
  pub fn set_node_errors(&mut self, id: &str, errors: Vec<String>) {
    if errors.is_empty() {
      self.node_errors.remove(id);
    } else {
      self.node_errors.insert(id.to_string(), errors);
    }
  }

  pub fn clear_node_errors(&mut self) {
    self.node_errors.clear();
  }

  pub fn flow_id(&self) -> Option<&str> {
    self.flow_id.as_deref()
  }

  pub fn is_building(&self) -> bool {
    self.is_building
  }

  pub fn build_info(&self) -> Option<&BuildInfo> {
    self.build_info.as_ref()
  }

  pub fn run(&self) -> Option<&RunDescriptor> {
    self.run.as_ref()
  }

  pub fn run_id(&self) -> Option<&str> {
    self.run.as_ref().map(RunDescriptor::run_id)
  }

  pub fn registry(&self) -> &BuildStatusRegistry {
    &self.registry
  }

  pub fn pool(&self) -> &FlowExecutionPool {
    &self.pool
  }

  pub fn edges(&self) -> &FlowEdges {
    &self.edges
  }

  pub fn status(&self, id: &str) -> Option<BuildStatus> {
    self.registry.get(id)
  }

  pub fn current_building_node_ids(&self) -> &[String] {
    &self.current_building
  }

  pub fn node_errors(&self) -> &BTreeMap<String, Vec<String>> {
    &self.node_errors
  }

  pub fn has_node_errors(&self) -> bool {
    !self.node_errors.is_empty()
  }

  /// All node error messages, in node id order.
  pub fn node_error_messages(&self) -> Vec<String> {
    self.node_errors.values().flatten().cloned().collect()
  }

  /// Whether `id` is a node of the open flow. Always true when the flow
  /// was opened without its topology.
  pub fn is_known_node(&self, id: &str) -> bool {
    self.nodes.is_empty() || self.nodes.contains(id)
  }

  pub fn pending(&self) -> &BTreeSet<String> {
    &self.pending
  }

  /// Whether `id` reached BUILT, ERROR or INACTIVE since the current run started.
  pub fn has_finished_in_run(&self, id: &str) -> bool {
    self.finished.contains(id)
  }

  /// The first node of the current run that is BUILDING, in run order.
  /// Falls back to the registry for builds started outside a known run.
  pub fn first_building_node(&self) -> Option<&str> {
    let in_run = self.run.as_ref().and_then(|run| {
      run
        .vertices_ids()
        .iter()
        .find(|id| self.registry.get(id) == Some(BuildStatus::Building))
    });

    match in_run {
      Some(id) => Some(id.as_str()),
      None => self
        .registry
        .iter()
        .find(|(_, status)| *status == BuildStatus::Building)
        .map(|(id, _)| id),
    }
  }

  /// `(finished, total)` over the vertices the current run is scheduled to build.
  pub fn progress(&self) -> (usize, usize) {
    let Some(run) = &self.run else {
      return (0, 0);
    };
    let total = run.vertices_to_run().len();
    (total.saturating_sub(self.pending.len()), total)
  }
}
